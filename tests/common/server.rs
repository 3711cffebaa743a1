//! Test server management.
//!
//! Spawns tsircd instances from the built binary with a generated
//! config in a temp directory. The server listener is always bound one
//! port above the client listener.

use std::process::{Child, Command};
use std::time::Duration;
use tokio::time::sleep;

pub struct TestServer {
    child: Child,
    port: u16,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Spawn a standalone instance on `port` (clients) and `port + 1`
    /// (servers).
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_named("test.server", "0TS", port, "").await
    }

    /// Spawn with an explicit identity and extra config appended; used
    /// by the server-to-server tests to add link blocks.
    pub async fn spawn_named(
        name: &str,
        sid: &str,
        port: u16,
        extra: &str,
    ) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("config.toml");
        let config = format!(
            r#"
[server]
name = "{name}"
sid = "{sid}"
description = "test instance"

[listen]
clients = "127.0.0.1:{port}"
servers = "127.0.0.1:{sport}"

[[oper]]
name = "testop"
password = "testpass"

{extra}
"#,
            sport = port + 1,
        );
        std::fs::write(&config_path, config)?;

        let child = Command::new(env!("CARGO_BIN_EXE_tsircd"))
            .arg(&config_path)
            .spawn()?;

        let server = Self {
            child,
            port,
            _dir: dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..30 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server failed to start within 3 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// The peer-server listener address, for link blocks.
    #[allow(dead_code)]
    pub fn server_address(&self) -> String {
        format!("127.0.0.1:{}", self.port + 1)
    }

    pub async fn connect(&self, nick: &str) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.address(), nick).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
