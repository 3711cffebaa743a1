//! The teardown reaper.
//!
//! Links are never torn down inline — whoever detects the failure
//! condemns the link (flipping its doomed flag exactly once) and the
//! reaper does the rest on its own task: deregistering the link,
//! quitting the user or splitting the server, and announcing the
//! departure. Fanout iterates snapshots, so a link condemned mid-fanout
//! stays registered until the reaper sweeps it here.

use crate::network::fanout::{EventSource, Outbound};
use crate::state::actor::ChannelEvent;
use crate::state::{Condemned, LinkId, LinkKind, Matrix, Uid, UserAttach};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tsirc_proto::irc_to_lower;

pub async fn run(matrix: Arc<Matrix>, mut rx: mpsc::UnboundedReceiver<Condemned>) {
    while let Some(condemned) = rx.recv().await {
        reap(&matrix, condemned).await;
    }
}

async fn reap(matrix: &Arc<Matrix>, condemned: Condemned) {
    let Some((_, link)) = matrix.links.remove(&condemned.link) else {
        return;
    };
    match &link.kind {
        LinkKind::Client { uid } => {
            info!(link = link.id, reason = %condemned.reason, "reaping client link");
            quit_user(matrix, uid, &condemned.reason, None).await;
        }
        LinkKind::Server { name } => {
            info!(link = link.id, server = %name, reason = %condemned.reason, "reaping server link");
            matrix.servers.remove(&irc_to_lower(name));

            // Every user that reached us through this link goes with it.
            let lost: Vec<Uid> = matrix
                .users
                .iter()
                .filter(|u| {
                    matches!(u.attach, UserAttach::Remote { via, .. } if via == link.id)
                })
                .map(|u| u.uid.clone())
                .collect();
            let split_message = format!("{} {}", matrix.server_info.name, name);
            for uid in lost {
                quit_user(matrix, &uid, &split_message, Some(link.id)).await;
            }

            let mut out = Outbound::new(
                matrix,
                EventSource::Server(matrix.server_info.name.clone()),
                "SQUIT",
                vec![name.clone(), condemned.reason.clone()],
            );
            out.send_to_servers(matrix, Some(link.id));
        }
    }
}

/// Remove a user everywhere: entity store, every channel they were in
/// (under one shared serial so common members hear one QUIT), and peer
/// servers beyond `except`.
pub async fn quit_user(matrix: &Arc<Matrix>, uid: &Uid, message: &str, except: Option<LinkId>) {
    let Some((_, user)) = matrix.users.remove(uid) else {
        return;
    };
    matrix.nicks.remove(&irc_to_lower(&user.nick));

    let serial = matrix.next_fanout_serial();
    for channel in &user.channels {
        if let Some(tx) = matrix.find_channel(channel) {
            let _ = tx
                .send(ChannelEvent::Quit {
                    uid: uid.clone(),
                    message: message.to_string(),
                    serial,
                })
                .await;
        }
    }

    let mut out = Outbound::for_serial(
        serial,
        EventSource::User {
            nick: user.nick.clone(),
            user: user.user.clone(),
            host: user.host.clone(),
        },
        "QUIT",
        vec![message.to_string()],
    );
    out.send_to_servers(matrix, except);
}
