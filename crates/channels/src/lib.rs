//! Provider delivery adapters implementing the engine's `ChannelSender`
//! port: FCM for push, SendGrid for email, Twilio for SMS.
//!
//! Every adapter supports a mock mode that short-circuits the provider call
//! with a synthetic message id, for local development and tests.

pub mod email;
pub mod push;
pub mod sms;

pub use email::SendgridEmailSender;
pub use push::FcmPushSender;
pub use sms::TwilioSmsSender;
