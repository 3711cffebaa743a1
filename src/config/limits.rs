//! Protocol limits configuration.

use serde::Deserialize;

/// Limits that bound per-request and per-channel state.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum mode changes a local client may pack into one MODE
    /// request. Server-origin bursts are not subject to this ceiling.
    #[serde(default = "default_max_modes")]
    pub max_modes: usize,
    /// Maximum bans a channel may carry; locally-requested additions
    /// beyond this are rejected.
    #[serde(default = "default_max_bans")]
    pub max_bans: usize,
    /// Channel actor mailbox capacity.
    #[serde(default = "default_channel_mailbox_capacity")]
    pub channel_mailbox_capacity: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_modes: default_max_modes(),
            max_bans: default_max_bans(),
            channel_mailbox_capacity: default_channel_mailbox_capacity(),
        }
    }
}

fn default_max_modes() -> usize {
    4
}

fn default_max_bans() -> usize {
    60
}

fn default_channel_mailbox_capacity() -> usize {
    500
}
