//! Connection class configuration.
//!
//! A class groups connections that share resource limits. The limit that
//! matters most here is `sendq`: the outbound queue byte budget whose
//! violation is fatal for the link.

use serde::Deserialize;

/// A connection class block.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassConfig {
    pub name: String,
    /// Outbound queue limit in bytes. Exceeding it tears the link down.
    #[serde(default = "default_sendq")]
    pub sendq: usize,
    /// Seconds of silence before a PING probe is sent.
    #[serde(default = "default_ping_frequency")]
    pub ping_frequency: u64,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            sendq: default_sendq(),
            ping_frequency: default_ping_frequency(),
        }
    }
}

fn default_sendq() -> usize {
    // Clients get a modest budget; server classes should override this
    // upward in the config (bursts are large).
    64 * 1024
}

fn default_ping_frequency() -> u64 {
    120
}
