//! Channel selection — computes the ordered candidate list for a dispatch
//! or retry cycle.
//!
//! Priority is fixed: push → email → sms. A channel qualifies only when the
//! recipient has the matching contact capability and, on first dispatch,
//! the channel is enabled for the event type under the user's preferences.
//! SMS carries an extra gate: deliverer role, or the global SMS toggle.

use std::collections::HashMap;

use herald_common::types::{ChannelKind, Preferences, Recipient};

pub struct ChannelSelector;

impl ChannelSelector {
    /// Ordered candidates for a first dispatch.
    pub fn candidates(
        recipient: &Recipient,
        event_type: &str,
        preferences: &Preferences,
    ) -> Vec<ChannelKind> {
        ChannelKind::PRIORITY
            .into_iter()
            .filter(|&channel| {
                if !recipient.has_capability(channel) {
                    return false;
                }
                if !preferences.is_event_channel_enabled(event_type, channel) {
                    return false;
                }
                if channel == ChannelKind::Sms {
                    return recipient.is_deliverer() || preferences.channels.sms;
                }
                true
            })
            .collect()
    }

    /// Ordered candidates for a retry cycle.
    ///
    /// Preferences are not re-consulted here; eligibility is capability plus
    /// the role gate on SMS, minus channels that already reached the
    /// per-channel attempt cap.
    pub fn retry_candidates(
        recipient: &Recipient,
        attempt_counts: &HashMap<ChannelKind, usize>,
        max_attempts_per_channel: usize,
    ) -> Vec<ChannelKind> {
        ChannelKind::PRIORITY
            .into_iter()
            .filter(|&channel| {
                if !recipient.has_capability(channel) {
                    return false;
                }
                if channel == ChannelKind::Sms && !recipient.is_deliverer() {
                    return false;
                }
                attempt_counts.get(&channel).copied().unwrap_or(0) < max_attempts_per_channel
            })
            .collect()
    }
}
