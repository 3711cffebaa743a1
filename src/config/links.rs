//! Peer server link configuration.

use serde::Deserialize;

/// A configured peer server.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// The peer's server name; the SERVER handshake must present it.
    pub name: String,
    /// `host:port` to connect to, or empty for accept-only links.
    #[serde(default)]
    pub address: String,
    /// Link password exchanged via PASS.
    pub password: String,
    /// Connection class governing this link's sendq.
    #[serde(default = "default_link_class")]
    pub class: String,
    /// Whether the peer only understands the legacy dual-timestamp
    /// SJOIN form.
    #[serde(default)]
    pub legacy_sjoin: bool,
    /// Connect automatically at startup (outbound links only).
    #[serde(default)]
    pub autoconnect: bool,
}

fn default_link_class() -> String {
    "default".to_string()
}
