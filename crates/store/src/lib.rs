//! Concrete adapters behind the engine's ports: PostgreSQL repositories for
//! notifications, attempts, templates, and preferences; the Redis inbox
//! (idempotency gate); and the Redis-stream event bus publisher.

pub mod attempts;
pub mod bus;
pub mod erasure;
pub mod inbox;
pub mod notifications;
pub mod preferences;
pub mod templates;
