//! The channel actor's mailbox vocabulary.
//!
//! Handlers and the server-sync layer never touch channel state
//! directly; they describe what happened as a `ChannelEvent` and, where
//! a caller needs an answer, attach a oneshot reply.

use crate::state::{Ban, ChannelModes, Member, MemberModes, ModeOutcome, Topic, Uid};
use crate::state::LinkId;
use crate::sync::burst::SjoinIn;
use tokio::sync::oneshot;

/// Why a join was refused, mapped to a numeric by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDenied {
    InviteOnly, // 473
    BadKey,     // 475
    Full,       // 471
    Banned,     // 474
}

/// Successful join, with everything the handler needs for its replies.
#[derive(Debug)]
pub struct JoinOk {
    pub channel: String,
    pub topic: Option<Topic>,
    /// `(sigil, nick)` pairs for RPL_NAMREPLY.
    pub names: Vec<(Option<char>, String)>,
    /// The requester was already a member; nothing happened.
    pub already: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickDenied {
    NotOnChannel,  // 442: kicker is not a member
    NotOp,         // 482
    TargetAbsent,  // 441
}

#[derive(Debug)]
pub enum TopicResult {
    /// TOPIC with no argument.
    Query(Option<Topic>),
    Set,
    NotOnChannel, // 442
    NotOp,        // 482 under +t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteDenied {
    NotOnChannel,    // 442
    NotOp,           // 482 when the channel is +i
    AlreadyOnChannel, // 443
}

/// Who asked for a mode change. The actor derives the privilege tier
/// itself: membership and chanop status are its state, not the caller's.
#[derive(Debug, Clone)]
pub enum ModeOrigin {
    /// A local client, identified and prefixed by their hostmask.
    Member {
        uid: Uid,
        nick: String,
        user: String,
        host: String,
    },
    /// A peer server; bypasses privilege checks and the mode ceiling.
    Server { name: String, via: LinkId },
}

impl ModeOrigin {
    /// The prefix string as it will appear on the emitted line, used
    /// for the output byte budget.
    pub fn prefix(&self) -> String {
        match self {
            ModeOrigin::Member {
                nick, user, host, ..
            } => format!("{}!{}@{}", nick, user, host),
            ModeOrigin::Server { name, .. } => name.clone(),
        }
    }
}

/// Point-in-time copy of actor state, for queries and tests.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub name: String,
    pub ts: i64,
    pub modes: ChannelModes,
    pub members: Vec<SnapshotMember>,
    pub bans: Vec<Ban>,
    pub topic: Option<Topic>,
}

#[derive(Debug, Clone)]
pub struct SnapshotMember {
    pub uid: Uid,
    pub nick: String,
    pub modes: MemberModes,
    pub ban_hits: u32,
}

impl ChannelSnapshot {
    pub fn member(&self, nick: &str) -> Option<&SnapshotMember> {
        self.members
            .iter()
            .find(|m| tsirc_proto::irc_eq(&m.nick, nick))
    }
}

/// Everything a channel actor can be asked to do.
pub enum ChannelEvent {
    Join {
        member: Member,
        key: Option<String>,
        reply: oneshot::Sender<Result<JoinOk, JoinDenied>>,
    },
    Part {
        uid: Uid,
        message: Option<String>,
        /// False when the user was not a member.
        reply: oneshot::Sender<bool>,
    },
    /// User disconnected. `serial` is allocated by the reaper so the
    /// QUIT reaches each link once across every channel involved.
    Quit {
        uid: Uid,
        message: String,
        serial: u64,
    },
    /// User changed nick; like QUIT, one serial spans every channel.
    NickChange {
        uid: Uid,
        old_nick: String,
        new_nick: String,
        serial: u64,
    },
    Kick {
        by: Uid,
        target: String,
        reason: String,
        reply: oneshot::Sender<Result<(), KickDenied>>,
    },
    Mode {
        origin: ModeOrigin,
        tokens: String,
        args: Vec<String>,
        /// None for relayed server modes nobody is waiting on.
        reply: Option<oneshot::Sender<ModeOutcome>>,
    },
    /// MODE query with no arguments: `(mode string, args, channel TS)`.
    ModeQuery {
        reply: oneshot::Sender<(String, Vec<String>, i64)>,
    },
    /// `MODE #chan +b` with no mask.
    ListBans {
        reply: oneshot::Sender<Vec<Ban>>,
    },
    Topic {
        uid: Uid,
        text: Option<String>,
        reply: oneshot::Sender<TopicResult>,
    },
    Privmsg {
        uid: Uid,
        notice: bool,
        text: String,
        /// False when the send gate refused the message (404).
        reply: oneshot::Sender<bool>,
    },
    Invite {
        by: Uid,
        target: Uid,
        reply: oneshot::Sender<Result<(), InviteDenied>>,
    },
    /// An SJOIN arrived from a peer; run the timestamp merge.
    Sjoin { via: LinkId, sjoin: SjoinIn },
    /// A freshly-linked peer needs this channel's state.
    Burst { to: LinkId },
    Snapshot {
        reply: oneshot::Sender<ChannelSnapshot>,
    },
}
