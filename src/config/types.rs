//! Core configuration types.

use super::{ClassConfig, LimitsConfig, LinkBlock, OperBlock};
use anyhow::Context as _;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Connection classes. A class named `default` (added implicitly if
    /// absent) governs client connections without an explicit class.
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassConfig>,
    /// Peer server link blocks.
    #[serde(default, rename = "link")]
    pub links: Vec<LinkBlock>,
    /// Operator credentials.
    #[serde(default, rename = "oper")]
    pub opers: Vec<OperBlock>,
}

/// This server's identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name as it appears in prefixes (e.g. `irc.example.net`).
    pub name: String,
    /// TS6-style server ID: one digit followed by two alphanumerics.
    pub sid: String,
    #[serde(default = "default_description")]
    pub description: String,
}

/// Listener binds.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_client_bind")]
    pub clients: String,
    #[serde(default = "default_server_bind")]
    pub servers: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            clients: default_client_bind(),
            servers: default_server_bind(),
        }
    }
}

fn default_description() -> String {
    "tsircd".to_string()
}

fn default_client_bind() -> String {
    "0.0.0.0:6667".to_string()
}

fn default_server_bind() -> String {
    "0.0.0.0:7000".to_string()
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        if !config.classes.iter().any(|c| c.name == "default") {
            config.classes.push(ClassConfig::default());
        }
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.sid.len() == 3
                && self.server.sid.starts_with(|c: char| c.is_ascii_digit()),
            "server.sid must be a digit followed by two alphanumerics"
        );
        anyhow::ensure!(
            self.server.name.contains('.'),
            "server.name must contain a dot"
        );
        for link in &self.links {
            anyhow::ensure!(
                self.classes.iter().any(|c| c.name == link.class) || link.class == "default",
                "link {} references unknown class {}",
                link.name,
                link.class
            );
        }
        Ok(())
    }

    /// Find a class by name, falling back to the default class.
    pub fn class(&self, name: &str) -> ClassConfig {
        self.classes
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(body.as_bytes()).expect("write");
        f
    }

    #[test]
    fn loads_minimal_config() {
        let f = write_config(
            r#"
            [server]
            name = "irc.example.net"
            sid = "0AB"
            "#,
        );
        let config = Config::load(f.path()).unwrap();
        assert_eq!(config.server.name, "irc.example.net");
        assert_eq!(config.listen.clients, "0.0.0.0:6667");
        // Implicit default class is appended.
        assert!(config.classes.iter().any(|c| c.name == "default"));
    }

    #[test]
    fn rejects_bad_sid() {
        let f = write_config(
            r#"
            [server]
            name = "irc.example.net"
            sid = "XYZ"
            "#,
        );
        assert!(Config::load(f.path()).is_err());
    }

    #[test]
    fn link_must_name_known_class() {
        let f = write_config(
            r#"
            [server]
            name = "irc.example.net"
            sid = "0AB"

            [[link]]
            name = "hub.example.net"
            address = "10.0.0.1:7000"
            password = "s"
            class = "nope"
            "#,
        );
        assert!(Config::load(f.path()).is_err());
    }

    #[test]
    fn class_lookup_falls_back_to_default() {
        let f = write_config(
            r#"
            [server]
            name = "irc.example.net"
            sid = "0AB"

            [[class]]
            name = "servers"
            sendq = 1048576
            "#,
        );
        let config = Config::load(f.path()).unwrap();
        assert_eq!(config.class("servers").sendq, 1_048_576);
        assert_eq!(config.class("missing").name, "default");
    }
}
