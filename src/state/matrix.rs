//! The Matrix — central shared state for the daemon.
//!
//! Holds all users, channel actor handles and physical links in
//! concurrent registries accessible from any task. Per-channel mutation
//! never happens here: the Matrix only routes events to the owning
//! channel actor.

use crate::config::Config;
use crate::state::actor::{ChannelActor, ChannelEvent};
use crate::state::{Link, LinkId, UidGenerator};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tsirc_proto::irc_to_lower;

/// Unique user identifier (TS6 format: 9 characters).
pub type Uid = String;

/// How a user reaches this server.
#[derive(Debug, Clone)]
pub enum UserAttach {
    /// Directly connected; the link is theirs alone.
    Local(LinkId),
    /// Introduced by a peer; reachable only through that server link.
    Remote { via: LinkId, server: String },
}

/// A known user, local or remote.
#[derive(Debug, Clone)]
pub struct User {
    pub uid: Uid,
    pub nick: String,
    pub user: String,
    pub host: String,
    pub ip: String,
    pub oper: bool,
    pub attach: UserAttach,
    /// Channels this user is in (folded names).
    pub channels: HashSet<String>,
}

impl User {
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    pub fn link_id(&self) -> LinkId {
        match self.attach {
            UserAttach::Local(id) => id,
            UserAttach::Remote { via, .. } => via,
        }
    }
}

/// This server's identity.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub sid: String,
    pub description: String,
    pub created: i64,
}

/// A link condemned to teardown, queued for the reaper task.
#[derive(Debug)]
pub struct Condemned {
    pub link: LinkId,
    pub reason: String,
}

/// Central state container.
pub struct Matrix {
    /// All known users, indexed by UID.
    pub users: DashMap<Uid, User>,
    /// Folded nick -> UID.
    pub nicks: DashMap<String, Uid>,
    /// Folded channel name -> owning actor mailbox.
    pub channels: DashMap<String, mpsc::Sender<ChannelEvent>>,
    /// All physical links by stable id.
    pub links: DashMap<LinkId, Arc<Link>>,
    /// Folded peer server name -> link id.
    pub servers: DashMap<String, LinkId>,

    pub server_info: ServerInfo,
    pub config: Config,
    pub uid_gen: UidGenerator,

    next_link_id: AtomicU64,
    fanout_serial: AtomicU64,
    reaper_tx: mpsc::UnboundedSender<Condemned>,
}

impl Matrix {
    pub fn new(config: Config, reaper_tx: mpsc::UnboundedSender<Condemned>) -> Arc<Matrix> {
        let server_info = ServerInfo {
            name: config.server.name.clone(),
            sid: config.server.sid.clone(),
            description: config.server.description.clone(),
            created: chrono::Utc::now().timestamp(),
        };
        let uid_gen = UidGenerator::new(config.server.sid.clone());
        Arc::new(Matrix {
            users: DashMap::new(),
            nicks: DashMap::new(),
            channels: DashMap::new(),
            links: DashMap::new(),
            servers: DashMap::new(),
            server_info,
            config,
            uid_gen,
            // Serial 0 is the "never delivered" stamp on fresh links.
            next_link_id: AtomicU64::new(1),
            fanout_serial: AtomicU64::new(1),
            reaper_tx,
        })
    }

    pub fn next_link_id(&self) -> LinkId {
        self.next_link_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Call-scoped serial for one logical fanout event.
    pub fn next_fanout_serial(&self) -> u64 {
        self.fanout_serial.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_link(&self, link: Arc<Link>) {
        self.links.insert(link.id, link);
    }

    /// Look up a channel actor mailbox.
    pub fn find_channel(&self, name: &str) -> Option<mpsc::Sender<ChannelEvent>> {
        self.channels.get(&irc_to_lower(name)).map(|e| e.clone())
    }

    /// Get or spawn the actor owning `name`. Returns `(mailbox, created)`.
    pub fn get_or_create_channel(
        self: &Arc<Self>,
        name: &str,
    ) -> (mpsc::Sender<ChannelEvent>, bool) {
        let folded = irc_to_lower(name);
        if let Some(tx) = self.channels.get(&folded) {
            return (tx.clone(), false);
        }
        let tx = ChannelActor::spawn(
            name.to_string(),
            Arc::downgrade(self),
            self.config.limits.channel_mailbox_capacity,
        );
        match self.channels.entry(folded) {
            dashmap::Entry::Occupied(existing) => (existing.get().clone(), false),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(tx.clone());
                (tx, true)
            }
        }
    }

    /// Remove a channel's mailbox; called by the actor when it drains.
    pub fn remove_channel(&self, folded_name: &str) {
        self.channels.remove(folded_name);
    }

    pub fn find_uid_by_nick(&self, nick: &str) -> Option<Uid> {
        self.nicks.get(&irc_to_lower(nick)).map(|e| e.clone())
    }

    /// Snapshot of live peer server links, optionally excluding the one
    /// an event arrived on. Snapshot-then-act: callers may condemn links
    /// while iterating the returned set.
    pub fn server_links(&self, except: Option<LinkId>) -> Vec<Arc<Link>> {
        self.links
            .iter()
            .filter(|e| e.value().is_server() && !e.value().is_doomed())
            .filter(|e| Some(e.value().id) != except)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Snapshot of links belonging to local operators.
    pub fn local_oper_links(&self) -> Vec<Arc<Link>> {
        let mut out = Vec::new();
        for user in self.users.iter() {
            if let (true, UserAttach::Local(id)) = (user.oper, &user.attach) {
                if let Some(link) = self.links.get(id) {
                    if !link.is_doomed() {
                        out.push(link.clone());
                    }
                }
            }
        }
        out
    }

    /// Mark a link for teardown and hand it to the reaper exactly once.
    /// Safe to call from inside fanout iteration: the link stays in the
    /// registry until the reaper sweeps it.
    pub fn condemn_link(&self, id: LinkId, reason: &str) {
        if let Some(link) = self.links.get(&id) {
            if link.condemn() {
                tracing::warn!(link = id, reason = %reason, "link condemned");
                let _ = self.reaper_tx.send(Condemned {
                    link: id,
                    reason: reason.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{attach_client, attach_server, test_matrix};

    #[tokio::test]
    async fn channel_creation_is_idempotent() {
        let (matrix, _rx) = test_matrix();
        let (_tx, created) = matrix.get_or_create_channel("#Rust");
        assert!(created);
        let (_tx, created) = matrix.get_or_create_channel("#rust");
        assert!(!created);
        assert!(matrix.find_channel("#RUST").is_some());
    }

    #[tokio::test]
    async fn condemn_is_delivered_once() {
        let (matrix, mut rx) = test_matrix();
        let (link, _out) = attach_server(&matrix, "hub.test.net", 1024);
        matrix.condemn_link(link.id, "sendq");
        matrix.condemn_link(link.id, "sendq again");
        let condemned = rx.recv().await.unwrap();
        assert_eq!(condemned.link, link.id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn server_links_excludes_origin_and_doomed() {
        let (matrix, _rx) = test_matrix();
        let (a, _) = attach_server(&matrix, "a.net", 1024);
        let (b, _) = attach_server(&matrix, "b.net", 1024);
        attach_client(&matrix, "0ABAAAAAA", 1024);

        let all = matrix.server_links(None);
        assert_eq!(all.len(), 2);
        let without_a = matrix.server_links(Some(a.id));
        assert_eq!(without_a.len(), 1);
        assert_eq!(without_a[0].id, b.id);

        b.condemn();
        assert!(matrix.server_links(None).iter().all(|l| l.id == a.id));
    }
}
