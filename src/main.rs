//! tsircd - timestamp-protocol IRC daemon.
//!
//! Channel state lives in per-channel actor tasks; everything shared
//! (users, links, channel mailboxes) sits in the [`state::Matrix`].
//! Peer servers reconcile channel state with the SJOIN timestamp merge.

mod config;
mod error;
mod handlers;
mod network;
mod state;
mod sync;
#[cfg(test)]
mod testutil;

use crate::config::Config;
use crate::network::Gateway;
use crate::state::Matrix;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        server = %config.server.name,
        sid = %config.server.sid,
        version = env!("CARGO_PKG_VERSION"),
        "starting tsircd"
    );

    let (reaper_tx, reaper_rx) = mpsc::unbounded_channel();
    let matrix = Matrix::new(config, reaper_tx);

    tokio::spawn(network::reaper::run(matrix.clone(), reaper_rx));
    tokio::spawn(network::sweep::run(matrix.clone()));
    network::peer::spawn_autoconnect(&matrix);

    let gateway = Gateway::bind(matrix).await?;
    gateway.run().await
}
