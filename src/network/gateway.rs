//! Gateway: the TCP listeners that feed the daemon.
//!
//! Two binds: one for clients, one for peer servers. Every accepted
//! socket gets its own task; the gateway itself never blocks on a
//! connection.

use crate::handlers::Registry;
use crate::network::{connection, peer};
use crate::state::Matrix;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct Gateway {
    clients: TcpListener,
    servers: TcpListener,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind both listeners from the loaded configuration.
    pub async fn bind(matrix: Arc<Matrix>) -> anyhow::Result<Gateway> {
        let clients = TcpListener::bind(&matrix.config.listen.clients).await?;
        info!(address = %matrix.config.listen.clients, "client listener bound");
        let servers = TcpListener::bind(&matrix.config.listen.servers).await?;
        info!(address = %matrix.config.listen.servers, "server listener bound");
        Ok(Gateway {
            clients,
            servers,
            matrix,
            registry: Arc::new(Registry::new()),
        })
    }

    /// Accept connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = self.clients.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(connection::serve(
                            self.matrix.clone(),
                            self.registry.clone(),
                            stream,
                            addr,
                        ));
                    }
                    Err(e) => warn!(error = %e, "client accept failed"),
                },
                accepted = self.servers.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!(%addr, "inbound server connection");
                        tokio::spawn(peer::serve_inbound(self.matrix.clone(), stream, addr));
                    }
                    Err(e) => warn!(error = %e, "server accept failed"),
                },
            }
        }
    }
}
