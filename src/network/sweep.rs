//! Liveness sweep.
//!
//! Walks the link registry on an interval. A link idle past its class's
//! ping frequency gets one PING probe; still silent a full interval
//! later, it is condemned. Teardown itself is the reaper's job.

use crate::network::fanout;
use crate::state::{LinkKind, Matrix};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tsirc_proto::{Message, Prefix};

const SWEEP_INTERVAL_SECS: u64 = 30;

pub async fn run(matrix: Arc<Matrix>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    loop {
        ticker.tick().await;
        sweep(&matrix);
    }
}

fn sweep(matrix: &Arc<Matrix>) {
    let now = chrono::Utc::now().timestamp();
    // Snapshot first: condemning mutates the registry via the reaper.
    let links: Vec<_> = matrix.links.iter().map(|e| e.value().clone()).collect();
    for link in links {
        if link.is_doomed() {
            continue;
        }
        let class = match &link.kind {
            LinkKind::Client { .. } => matrix.config.class("default"),
            LinkKind::Server { name } => {
                let class_name = matrix
                    .config
                    .links
                    .iter()
                    .find(|b| tsirc_proto::irc_eq(&b.name, name))
                    .map(|b| b.class.clone())
                    .unwrap_or_else(|| "default".to_string());
                matrix.config.class(&class_name)
            }
        };
        let idle = now - link.last_seen();
        if idle < class.ping_frequency as i64 {
            continue;
        }
        if link.mark_pinged() {
            debug!(link = link.id, idle, "probing idle link");
            let ping = Message::with_prefix(
                Prefix::Server(matrix.server_info.name.clone()),
                "PING",
                vec![matrix.server_info.name.clone()],
            );
            fanout::send_line(matrix, &link, &ping);
        } else {
            matrix.condemn_link(link.id, "ping timeout");
        }
    }
}
