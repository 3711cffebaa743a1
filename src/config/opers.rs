//! Operator blocks.

use serde::Deserialize;
use tsirc_proto::match_mask;

/// One `[[oper]]` block granting operator status.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    pub name: String,
    pub password: String,
    /// `user@host` mask the requester must match.
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "*@*".to_string()
}

impl OperBlock {
    pub fn accepts(&self, name: &str, password: &str, userhost: &str) -> bool {
        self.name == name && self.password == password && match_mask(&self.host, userhost)
    }
}
