//! Per-channel actor tasks.
//!
//! Every channel is owned by exactly one tokio task holding its state —
//! members, modes, bans, topic, timestamp — with a bounded mailbox as
//! the only way in. All mutation is serialized through that mailbox, so
//! the merge engine and the mode delta engine run without locks and
//! observe a consistent view.

mod events;
mod membership;
mod modes;
mod sjoin;

pub use events::{
    ChannelEvent, ChannelSnapshot, InviteDenied, JoinDenied, JoinOk, KickDenied, ModeOrigin,
    SnapshotMember, TopicResult,
};

use crate::network::fanout::{self, EventSource, FanoutCall};
use crate::state::{Ban, ChannelModes, Link, LinkId, Matrix, Member, MemberModes, Topic, Uid};
use crate::sync::burst::{render_sjoin, SjoinDialect};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;
use tsirc_proto::irc_to_lower;

pub struct ChannelActor {
    /// Display name as first created (`#Rust`).
    name: String,
    /// Casemapped name, the registry key.
    folded: String,
    ts: i64,
    modes: ChannelModes,
    topic: Option<Topic>,
    members: HashMap<Uid, Member>,
    bans: Vec<Ban>,
    invites: HashSet<Uid>,
    matrix: Weak<Matrix>,
    /// Set once the first member lands; an actor that empties out after
    /// that deregisters itself and stops.
    populated: bool,
}

impl ChannelActor {
    /// Spawn the owning task and hand back its mailbox.
    pub fn spawn(
        name: String,
        matrix: Weak<Matrix>,
        mailbox_capacity: usize,
    ) -> mpsc::Sender<ChannelEvent> {
        let (tx, rx) = mpsc::channel(mailbox_capacity);
        let actor = ChannelActor {
            folded: irc_to_lower(&name),
            name,
            ts: chrono::Utc::now().timestamp(),
            modes: ChannelModes::default(),
            topic: None,
            members: HashMap::new(),
            bans: Vec::new(),
            invites: HashSet::new(),
            matrix,
            populated: false,
        };
        tokio::spawn(actor.run(rx));
        tx
    }

    async fn run(mut self, mut rx: mpsc::Receiver<ChannelEvent>) {
        debug!(channel = %self.name, "channel actor started");
        while let Some(event) = rx.recv().await {
            let Some(matrix) = self.matrix.upgrade() else {
                break;
            };
            self.dispatch(&matrix, event);
            if self.populated && self.members.is_empty() {
                matrix.remove_channel(&self.folded);
                break;
            }
        }
        debug!(channel = %self.name, "channel actor stopped");
    }

    fn dispatch(&mut self, matrix: &Arc<Matrix>, event: ChannelEvent) {
        match event {
            ChannelEvent::Join { member, key, reply } => {
                let outcome = self.handle_join(matrix, member, key);
                let _ = reply.send(outcome);
            }
            ChannelEvent::Part {
                uid,
                message,
                reply,
            } => {
                let _ = reply.send(self.handle_part(matrix, &uid, message));
            }
            ChannelEvent::Quit {
                uid,
                message,
                serial,
            } => self.handle_quit(matrix, &uid, &message, serial),
            ChannelEvent::NickChange {
                uid,
                old_nick,
                new_nick,
                serial,
            } => self.handle_nick_change(matrix, &uid, &old_nick, &new_nick, serial),
            ChannelEvent::Kick {
                by,
                target,
                reason,
                reply,
            } => {
                let _ = reply.send(self.handle_kick(matrix, &by, &target, &reason));
            }
            ChannelEvent::Mode {
                origin,
                tokens,
                args,
                reply,
            } => {
                let outcome = self.handle_mode(matrix, &origin, &tokens, &args);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            ChannelEvent::ModeQuery { reply } => {
                let (letters, args) = self.modes.to_wire();
                let _ = reply.send((letters, args, self.ts));
            }
            ChannelEvent::ListBans { reply } => {
                let _ = reply.send(self.bans.clone());
            }
            ChannelEvent::Topic { uid, text, reply } => {
                let _ = reply.send(self.handle_topic(matrix, &uid, text));
            }
            ChannelEvent::Privmsg {
                uid,
                notice,
                text,
                reply,
            } => {
                let _ = reply.send(self.handle_privmsg(matrix, &uid, notice, &text));
            }
            ChannelEvent::Invite { by, target, reply } => {
                let _ = reply.send(self.handle_invite(matrix, &by, &target));
            }
            ChannelEvent::Sjoin { via, sjoin } => self.handle_sjoin(matrix, via, sjoin),
            ChannelEvent::Burst { to } => self.handle_burst(matrix, to),
            ChannelEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // --- shared queries ----------------------------------------------

    /// Any member currently holding chanop. Members whose op was swept
    /// by a merge carry `deopped` and no longer defend the channel.
    fn has_ops(&self) -> bool {
        self.members.values().any(|m| m.modes.op)
    }

    fn member_by_nick(&self, nick: &str) -> Option<&Uid> {
        self.members
            .iter()
            .find(|(_, m)| tsirc_proto::irc_eq(&m.nick, nick))
            .map(|(uid, _)| uid)
    }

    /// Links of locally-attached members, deduplicated by the fanout
    /// serial rather than here.
    fn member_links(&self) -> Vec<Arc<Link>> {
        self.members
            .values()
            .filter_map(|m| m.link.clone())
            .collect()
    }

    /// Bans matching this person, counted against both the resolved
    /// host and the raw IP.
    fn ban_hits_for(&self, nick: &str, user: &str, host: &str, ip: &str) -> u32 {
        self.bans
            .iter()
            .filter(|b| b.hits(nick, user, host) || b.hits(nick, user, ip))
            .count() as u32
    }

    /// Re-derive every member's cached hit count after the ban list
    /// changed. The message path only ever reads the cache.
    fn recompute_ban_hits(&mut self) {
        let bans = std::mem::take(&mut self.bans);
        for member in self.members.values_mut() {
            member.ban_hits = bans
                .iter()
                .filter(|b| {
                    b.hits(&member.nick, &member.user, &member.host)
                        || b.hits(&member.nick, &member.user, &member.ip)
                })
                .count() as u32;
        }
        self.bans = bans;
    }

    fn names(&self) -> Vec<(Option<char>, String)> {
        let mut names: Vec<_> = self
            .members
            .values()
            .map(|m| (m.modes.prefix_char(), m.nick.clone()))
            .collect();
        names.sort_by(|a, b| a.1.cmp(&b.1));
        names
    }

    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            name: self.name.clone(),
            ts: self.ts,
            modes: self.modes.clone(),
            members: self
                .members
                .values()
                .map(|m| SnapshotMember {
                    uid: m.uid.clone(),
                    nick: m.nick.clone(),
                    modes: m.modes,
                    ban_hits: m.ban_hits,
                })
                .collect(),
            bans: self.bans.clone(),
            topic: self.topic.clone(),
        }
    }

    /// The server link an event for `uid` arrived on, excluded from
    /// relays so traffic never bounces back to its origin.
    fn relay_exclusion(&self, matrix: &Arc<Matrix>, uid: &Uid) -> Option<LinkId> {
        matrix.users.get(uid).and_then(|u| match u.attach {
            crate::state::UserAttach::Remote { via, .. } => Some(via),
            crate::state::UserAttach::Local(_) => None,
        })
    }

    fn source_for(&self, member: &Member) -> EventSource {
        EventSource::User {
            nick: member.nick.clone(),
            user: member.user.clone(),
            host: member.host.clone(),
        }
    }

    /// Relay this channel's state (restricted to `members`) to peer
    /// servers, rendered once per burst dialect and delivered at most
    /// once per link.
    fn relay_sjoin(
        &self,
        matrix: &Arc<Matrix>,
        except: Option<LinkId>,
        members: &[(MemberModes, String)],
    ) {
        let call = FanoutCall::begin(matrix);
        let mut rendered: [Option<Vec<bytes::Bytes>>; 2] = [None, None];
        for link in matrix.server_links(except) {
            let dialect = if link.caps.legacy_sjoin {
                SjoinDialect::Legacy
            } else {
                SjoinDialect::Current
            };
            let slot = usize::from(link.caps.legacy_sjoin);
            let lines = rendered[slot].get_or_insert_with(|| {
                render_sjoin(
                    dialect,
                    &matrix.server_info.name,
                    self.ts,
                    &self.name,
                    &self.modes,
                    members,
                )
                .iter()
                .map(fanout::line_bytes)
                .collect()
            });
            call.deliver_lines(matrix, &link, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LinkCaps, LinkKind, ModeOutcome};
    use crate::sync::burst::SjoinIn;
    use crate::testutil::{
        add_local_user, add_remote_user, attach_client, attach_server, drain_lines, test_config,
        test_matrix,
    };
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn join(
        matrix: &Arc<Matrix>,
        tx: &mpsc::Sender<ChannelEvent>,
        link: &Arc<Link>,
        uid: &Uid,
        nick: &str,
    ) -> Result<JoinOk, JoinDenied> {
        let member = Member {
            uid: uid.clone(),
            nick: nick.to_string(),
            user: nick.to_string(),
            host: format!("{}.example.net", nick),
            ip: "192.0.2.10".into(),
            modes: MemberModes::default(),
            ban_hits: 0,
            link: Some(link.clone()),
        };
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Join {
            member,
            key: None,
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    async fn snapshot(tx: &mpsc::Sender<ChannelEvent>) -> ChannelSnapshot {
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Snapshot { reply }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn older_sjoin_with_ops_strips_and_adopts() {
        let (matrix, _reaper) = test_matrix();
        let (client, mut client_out) = attach_client(&matrix, "0ABAAAAAA", 65536);
        let alice = add_local_user(&matrix, &client, "alice");
        let (hub, _hub_out) = attach_server(&matrix, "hub.test.net", 65536);
        add_remote_user(&matrix, &hub, "hub.test.net", "bob");

        let (tx, created) = matrix.get_or_create_channel("#x");
        assert!(created);
        let ok = join(&matrix, &tx, &client, &alice, "alice").await.unwrap();
        assert!(!ok.already);
        drain_lines(&mut client_out);

        // The peer's copy predates ours and asserts an op for bob.
        tx.send(ChannelEvent::Sjoin {
            via: hub.id,
            sjoin: SjoinIn {
                ts: 1,
                channel: "#x".into(),
                modes: ChannelModes::from_wire("+m", &[]),
                members: vec!["@bob".into()],
            },
        })
        .await
        .unwrap();

        let snap = snapshot(&tx).await;
        assert_eq!(snap.ts, 1);
        assert!(snap.modes.flags.moderated);
        let alice_m = snap.member("alice").unwrap();
        assert!(!alice_m.modes.op);
        assert!(alice_m.modes.deopped);
        assert!(snap.member("bob").unwrap().modes.op);

        let lines = drain_lines(&mut client_out);
        // One canonical grouped delta: alice's op swept, +m adopted,
        // bob's asserted op granted.
        assert!(
            lines.iter().any(|l| l.contains("MODE")
                && l.contains("-o+mo")
                && l.contains("alice")
                && l.contains("bob")),
            "{:?}",
            lines
        );
        assert!(lines.iter().any(|l| l.contains("JOIN")), "{:?}", lines);
    }

    #[tokio::test]
    async fn newer_sjoin_against_defended_channel_joins_unprivileged() {
        let (matrix, _reaper) = test_matrix();
        let (client, _out) = attach_client(&matrix, "0ABAAAAAA", 65536);
        let alice = add_local_user(&matrix, &client, "alice");
        let (hub, _hub_out) = attach_server(&matrix, "hub.test.net", 65536);
        add_remote_user(&matrix, &hub, "hub.test.net", "bob");

        let (tx, _) = matrix.get_or_create_channel("#y");
        join(&matrix, &tx, &client, &alice, "alice").await.unwrap();
        let before = snapshot(&tx).await;

        tx.send(ChannelEvent::Sjoin {
            via: hub.id,
            sjoin: SjoinIn {
                ts: before.ts + 1000,
                channel: "#y".into(),
                modes: ChannelModes::from_wire("+s", &[]),
                members: vec!["+bob".into()],
            },
        })
        .await
        .unwrap();

        let snap = snapshot(&tx).await;
        assert_eq!(snap.ts, before.ts);
        assert!(!snap.modes.flags.secret);
        assert!(snap.member("alice").unwrap().modes.op);
        let bob = snap.member("bob").unwrap();
        assert!(!bob.modes.op && !bob.modes.voice);
    }

    #[tokio::test]
    async fn unprivileged_mode_request_is_latched_not_applied() {
        let (matrix, _reaper) = test_matrix();
        let (a_link, _a_out) = attach_client(&matrix, "0ABAAAAAA", 65536);
        let alice = add_local_user(&matrix, &a_link, "alice");
        let (b_link, mut b_out) = attach_client(&matrix, "0ABAAAAAB", 65536);
        let bob = add_local_user(&matrix, &b_link, "bob");

        let (tx, _) = matrix.get_or_create_channel("#z");
        join(&matrix, &tx, &a_link, &alice, "alice").await.unwrap();
        join(&matrix, &tx, &b_link, &bob, "bob").await.unwrap();
        drain_lines(&mut b_out);

        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Mode {
            origin: ModeOrigin::Member {
                uid: bob.clone(),
                nick: "bob".into(),
                user: "bob".into(),
                host: "bob.example.net".into(),
            },
            tokens: "+sb".into(),
            args: vec!["*!*@evil.example".into()],
            reply: Some(reply),
        })
        .await
        .unwrap();
        let outcome = rx.await.unwrap();

        assert!(outcome.privs_rejected);
        assert!(outcome.is_empty());
        let snap = snapshot(&tx).await;
        assert!(snap.bans.is_empty());
        assert!(!snap.modes.flags.secret);
        // Nothing took effect, so nothing was announced.
        let lines = drain_lines(&mut b_out);
        assert!(!lines.iter().any(|l| l.contains("MODE")), "{:?}", lines);
    }

    async fn request_mode(
        tx: &mpsc::Sender<ChannelEvent>,
        origin: ModeOrigin,
        tokens: &str,
        args: Vec<String>,
    ) -> ModeOutcome {
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Mode {
            origin,
            tokens: tokens.into(),
            args,
            reply: Some(reply),
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn ban_cap_binds_local_requesters_but_not_servers() {
        let mut config = test_config();
        config.limits.max_bans = 1;
        let (reaper_tx, _reaper) = mpsc::unbounded_channel();
        let matrix = Matrix::new(config, reaper_tx);
        let (client, _out) = attach_client(&matrix, "0ABAAAAAA", 65536);
        let alice = add_local_user(&matrix, &client, "alice");
        let (hub, _hub_out) = attach_server(&matrix, "hub.test.net", 65536);

        let (tx, _) = matrix.get_or_create_channel("#cap");
        join(&matrix, &tx, &client, &alice, "alice").await.unwrap();

        let alice_origin = || ModeOrigin::Member {
            uid: alice.clone(),
            nick: "alice".into(),
            user: "alice".into(),
            host: "alice.example.net".into(),
        };

        let first = request_mode(
            &tx,
            alice_origin(),
            "+b",
            vec!["*!*@one.example".into()],
        )
        .await;
        assert_eq!(first.tokens, "+b");

        // The channel is at the cap: a second local ban is dropped.
        let second = request_mode(
            &tx,
            alice_origin(),
            "+b",
            vec!["*!*@two.example".into()],
        )
        .await;
        assert!(second.is_empty());
        assert_eq!(snapshot(&tx).await.bans.len(), 1);

        // A relayed server ban lands past the cap.
        let relayed = request_mode(
            &tx,
            ModeOrigin::Server {
                name: "hub.test.net".into(),
                via: hub.id,
            },
            "+b",
            vec!["*!*@two.example".into()],
        )
        .await;
        assert_eq!(relayed.tokens, "+b");
        assert_eq!(snapshot(&tx).await.bans.len(), 2);
    }

    #[tokio::test]
    async fn emptied_channel_deregisters_itself() {
        let (matrix, _reaper) = test_matrix();
        let (client, _out) = attach_client(&matrix, "0ABAAAAAA", 65536);
        let alice = add_local_user(&matrix, &client, "alice");

        let (tx, _) = matrix.get_or_create_channel("#gone");
        join(&matrix, &tx, &client, &alice, "alice").await.unwrap();

        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Part {
            uid: alice,
            message: None,
            reply,
        })
        .await
        .unwrap();
        assert!(rx.await.unwrap());

        for _ in 0..50 {
            if matrix.find_channel("#gone").is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("channel actor never deregistered");
    }

    #[tokio::test]
    async fn burst_renders_dialect_for_the_requesting_link() {
        let (matrix, _reaper) = test_matrix();
        let (client, _out) = attach_client(&matrix, "0ABAAAAAA", 65536);
        let alice = add_local_user(&matrix, &client, "alice");

        let (legacy_tx, mut legacy_rx) = mpsc::unbounded_channel::<Bytes>();
        let legacy = Arc::new(Link::new(
            matrix.next_link_id(),
            LinkKind::Server {
                name: "old.test.net".into(),
            },
            LinkCaps { legacy_sjoin: true },
            legacy_tx,
            65536,
        ));
        matrix.register_link(legacy.clone());

        let (tx, _) = matrix.get_or_create_channel("#b");
        join(&matrix, &tx, &client, &alice, "alice").await.unwrap();
        tx.send(ChannelEvent::Burst { to: legacy.id }).await.unwrap();
        snapshot(&tx).await;

        let lines = drain_lines(&mut legacy_rx);
        let sjoin = lines
            .iter()
            .find(|l| l.contains("SJOIN"))
            .unwrap_or_else(|| panic!("no SJOIN in {:?}", lines));
        // Legacy dialect repeats the timestamp.
        let args: Vec<&str> = sjoin.split_whitespace().collect();
        assert_eq!(args[2], args[3], "{}", sjoin);
        assert!(sjoin.contains("@alice"));
    }
}
