//! Routing for messages arriving on an established server link.
//!
//! Peer servers are trusted: privilege checks already happened on the
//! side where the user is local, so everything here either updates the
//! entity store directly or forwards into the owning channel actor with
//! server-tier origin.

use crate::error::{HandlerError, HandlerResult};
use crate::network::fanout::{self, EventSource, Outbound};
use crate::network::reaper;
use crate::state::actor::{ChannelEvent, ModeOrigin};
use crate::state::{Link, LinkId, Matrix, Uid, User, UserAttach};
use crate::sync::burst::parse_sjoin;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use tsirc_proto::{irc_to_lower, is_channel_name, Message, Prefix};

/// Handle one line from a peer. Errors are fatal for the link.
pub async fn dispatch(matrix: &Arc<Matrix>, link: &Arc<Link>, msg: Message) -> HandlerResult {
    match msg.command.as_str() {
        "PING" => {
            let token = msg.arg(0).unwrap_or(&matrix.server_info.name).to_string();
            let pong = Message::with_prefix(
                Prefix::Server(matrix.server_info.name.clone()),
                "PONG",
                vec![matrix.server_info.name.clone(), token],
            );
            fanout::send_line(matrix, link, &pong);
            Ok(())
        }
        // Liveness already noted by the read loop's touch().
        "PONG" => Ok(()),
        "UID" => handle_uid(matrix, link, &msg),
        "SJOIN" => handle_sjoin(matrix, link, &msg).await,
        "MODE" => handle_mode(matrix, link, &msg, 0).await,
        // TMODE prefixes the channel with its TS; the merge already
        // settled whose modes count, so the stamp is only validated.
        "TMODE" => handle_mode(matrix, link, &msg, 1).await,
        "PART" => handle_part(matrix, link, &msg).await,
        "KICK" => handle_kick(matrix, link, &msg).await,
        "TOPIC" => handle_topic(matrix, link, &msg).await,
        "PRIVMSG" | "NOTICE" => handle_privmsg(matrix, link, &msg).await,
        "NICK" => handle_nick(matrix, link, &msg).await,
        "QUIT" => handle_quit(matrix, link, &msg).await,
        "SQUIT" => handle_squit(matrix, link, &msg),
        "ERROR" => {
            let reason = msg.arg(0).unwrap_or("peer sent ERROR");
            Err(HandlerError::Quit(Some(reason.to_string())))
        }
        other => {
            debug!(link = link.id, command = %other, "unhandled server command");
            Ok(())
        }
    }
}

fn origin_nick(msg: &Message) -> Option<&str> {
    match &msg.prefix {
        Some(Prefix::User { nick, .. }) => Some(nick),
        _ => None,
    }
}

fn origin_uid(matrix: &Matrix, msg: &Message) -> Option<Uid> {
    origin_nick(msg).and_then(|nick| matrix.find_uid_by_nick(nick))
}

/// `:<server> UID <nick> <user> <host> <ip> <uid>` — a peer introducing
/// one of its users. A nick already taken locally wins; the
/// introduction is dropped and logged (the peer's user effectively does
/// not exist here until it renames).
fn handle_uid(matrix: &Arc<Matrix>, link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let (Some(nick), Some(user), Some(host), Some(ip), Some(uid)) = (
        msg.arg(0),
        msg.arg(1),
        msg.arg(2),
        msg.arg(3),
        msg.arg(4),
    ) else {
        return Err(HandlerError::NeedMoreParams);
    };
    if matrix.find_uid_by_nick(nick).is_some() {
        warn!(link = link.id, %nick, "remote introduction collides, dropped");
        return Ok(());
    }
    let server = match &msg.prefix {
        Some(Prefix::Server(name)) => name.clone(),
        _ => return Err(HandlerError::NotRegistered),
    };
    matrix.users.insert(
        uid.to_string(),
        User {
            uid: uid.to_string(),
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            ip: ip.to_string(),
            oper: false,
            attach: UserAttach::Remote {
                via: link.id,
                server,
            },
            channels: HashSet::new(),
        },
    );
    matrix.nicks.insert(irc_to_lower(nick), uid.to_string());

    // Introduce onward for the rest of the network.
    let mut out = Outbound::new(
        matrix,
        EventSource::Server(matrix.server_info.name.clone()),
        "UID",
        msg.params.clone(),
    );
    out.send_to_servers(matrix, Some(link.id));
    Ok(())
}

async fn handle_sjoin(matrix: &Arc<Matrix>, link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let Some(sjoin) = parse_sjoin(msg) else {
        warn!(link = link.id, line = %msg, "malformed SJOIN dropped");
        return Ok(());
    };
    let (tx, _created) = matrix.get_or_create_channel(&sjoin.channel);
    tx.send(ChannelEvent::Sjoin {
        via: link.id,
        sjoin,
    })
    .await
    .map_err(|_| HandlerError::Internal("channel mailbox closed".into()))
}

async fn handle_mode(
    matrix: &Arc<Matrix>,
    link: &Arc<Link>,
    msg: &Message,
    skip: usize,
) -> HandlerResult {
    if skip > 0 && msg.arg(0).map_or(true, |ts| ts.parse::<i64>().is_err()) {
        warn!(link = link.id, line = %msg, "malformed TMODE dropped");
        return Ok(());
    }
    let (Some(target), Some(tokens)) = (msg.arg(skip), msg.arg(skip + 1)) else {
        return Err(HandlerError::NeedMoreParams);
    };
    if !is_channel_name(target) {
        return Ok(()); // user modes are not synchronized
    }
    let Some(tx) = matrix.find_channel(target) else {
        return Ok(());
    };
    // Display the originator's name, but apply with server-tier trust.
    let name = match &msg.prefix {
        Some(Prefix::User { nick, .. }) => nick.clone(),
        Some(Prefix::Server(name)) => name.clone(),
        None => matrix.server_info.name.clone(),
    };
    let _ = tx
        .send(ChannelEvent::Mode {
            origin: ModeOrigin::Server { name, via: link.id },
            tokens: tokens.to_string(),
            args: msg.params[skip + 2..].to_vec(),
            reply: None,
        })
        .await;
    Ok(())
}

async fn handle_part(matrix: &Arc<Matrix>, _link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let Some(channel) = msg.arg(0) else {
        return Err(HandlerError::NeedMoreParams);
    };
    let Some(uid) = origin_uid(matrix, msg) else {
        return Ok(());
    };
    if let Some(tx) = matrix.find_channel(channel) {
        let (reply, _rx) = tokio::sync::oneshot::channel();
        let _ = tx
            .send(ChannelEvent::Part {
                uid,
                message: msg.arg(1).map(str::to_string),
                reply,
            })
            .await;
    }
    Ok(())
}

async fn handle_kick(matrix: &Arc<Matrix>, _link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let (Some(channel), Some(target)) = (msg.arg(0), msg.arg(1)) else {
        return Err(HandlerError::NeedMoreParams);
    };
    let Some(by) = origin_uid(matrix, msg) else {
        return Ok(());
    };
    if let Some(tx) = matrix.find_channel(channel) {
        let (reply, _rx) = tokio::sync::oneshot::channel();
        let _ = tx
            .send(ChannelEvent::Kick {
                by,
                target: target.to_string(),
                reason: msg.arg(2).unwrap_or(target).to_string(),
                reply,
            })
            .await;
    }
    Ok(())
}

async fn handle_topic(matrix: &Arc<Matrix>, _link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let (Some(channel), Some(text)) = (msg.arg(0), msg.arg(1)) else {
        return Err(HandlerError::NeedMoreParams);
    };
    let Some(uid) = origin_uid(matrix, msg) else {
        return Ok(());
    };
    if let Some(tx) = matrix.find_channel(channel) {
        let (reply, _rx) = tokio::sync::oneshot::channel();
        let _ = tx
            .send(ChannelEvent::Topic {
                uid,
                text: Some(text.to_string()),
                reply,
            })
            .await;
    }
    Ok(())
}

async fn handle_privmsg(matrix: &Arc<Matrix>, _link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let (Some(target), Some(text)) = (msg.arg(0), msg.arg(1)) else {
        return Err(HandlerError::NeedMoreParams);
    };
    let Some(uid) = origin_uid(matrix, msg) else {
        return Ok(());
    };
    let notice = msg.command == "NOTICE";
    if is_channel_name(target) {
        if let Some(tx) = matrix.find_channel(target) {
            let (reply, _rx) = tokio::sync::oneshot::channel();
            let _ = tx
                .send(ChannelEvent::Privmsg {
                    uid,
                    notice,
                    text: text.to_string(),
                    reply,
                })
                .await;
        }
        return Ok(());
    }
    deliver_user_message(matrix, &uid, target, notice, text);
    Ok(())
}

/// Direct user-to-user delivery, local or forwarded one hop onward.
pub fn deliver_user_message(
    matrix: &Arc<Matrix>,
    from: &Uid,
    target_nick: &str,
    notice: bool,
    text: &str,
) -> bool {
    let Some(target_uid) = matrix.find_uid_by_nick(target_nick) else {
        return false;
    };
    let Some(sender) = matrix.users.get(from).map(|u| u.clone()) else {
        return false;
    };
    let Some(target) = matrix.users.get(&target_uid).map(|u| u.clone()) else {
        return false;
    };
    let command = if notice { "NOTICE" } else { "PRIVMSG" };
    let prefix = match target.attach {
        // Local recipients see the full hostmask.
        UserAttach::Local(_) => Prefix::User {
            nick: sender.nick.clone(),
            user: sender.user.clone(),
            host: sender.host.clone(),
        },
        UserAttach::Remote { .. } => Prefix::User {
            nick: sender.nick.clone(),
            user: String::new(),
            host: String::new(),
        },
    };
    let line = Message::with_prefix(
        prefix,
        command,
        vec![target.nick.clone(), text.to_string()],
    );
    if let Some(dest) = matrix.links.get(&target.link_id()) {
        fanout::send_line(matrix, dest.value(), &line);
        true
    } else {
        false
    }
}

async fn handle_nick(matrix: &Arc<Matrix>, link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let Some(new_nick) = msg.arg(0) else {
        return Err(HandlerError::NeedMoreParams);
    };
    let Some(uid) = origin_uid(matrix, msg) else {
        return Ok(());
    };
    rename_user(matrix, &uid, new_nick, Some(link.id)).await;
    Ok(())
}

/// Rename a user everywhere: entity store, every channel they are in,
/// and peers beyond `except`. Returns false when the nick is taken.
pub async fn rename_user(
    matrix: &Arc<Matrix>,
    uid: &Uid,
    new_nick: &str,
    except: Option<LinkId>,
) -> bool {
    let folded = irc_to_lower(new_nick);
    if let Some(holder) = matrix.nicks.get(&folded) {
        if holder.value() != uid {
            return false;
        }
    }
    let (old_nick, user, host, channels) = {
        let Some(mut entry) = matrix.users.get_mut(uid) else {
            return false;
        };
        let old_nick = std::mem::replace(&mut entry.nick, new_nick.to_string());
        (
            old_nick,
            entry.user.clone(),
            entry.host.clone(),
            entry.channels.clone(),
        )
    };
    matrix.nicks.remove(&irc_to_lower(&old_nick));
    matrix.nicks.insert(folded, uid.clone());

    let serial = matrix.next_fanout_serial();
    for channel in &channels {
        if let Some(tx) = matrix.find_channel(channel) {
            let _ = tx
                .send(ChannelEvent::NickChange {
                    uid: uid.clone(),
                    old_nick: old_nick.clone(),
                    new_nick: new_nick.to_string(),
                    serial,
                })
                .await;
        }
    }
    let mut out = Outbound::for_serial(
        serial,
        EventSource::User {
            nick: old_nick,
            user,
            host,
        },
        "NICK",
        vec![new_nick.to_string()],
    );
    // Locally-attached users see their own rename even from an empty
    // channel list; the shared serial stops channel echoes doubling it.
    if let Some(user) = matrix.users.get(uid) {
        if let UserAttach::Local(id) = user.attach {
            if let Some(link) = matrix.links.get(&id) {
                out.send(matrix, link.value());
            }
        }
    }
    out.send_to_servers(matrix, except);
    true
}

async fn handle_quit(matrix: &Arc<Matrix>, link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let Some(uid) = origin_uid(matrix, msg) else {
        return Ok(());
    };
    let message = msg.arg(0).unwrap_or("Quit").to_string();
    reaper::quit_user(matrix, &uid, &message, Some(link.id)).await;
    Ok(())
}

/// `SQUIT <server> :<reason>` — a server is leaving the network. If it
/// is our direct peer we condemn the link; the reaper sweeps its users.
fn handle_squit(matrix: &Arc<Matrix>, link: &Arc<Link>, msg: &Message) -> HandlerResult {
    let Some(name) = msg.arg(0) else {
        return Err(HandlerError::NeedMoreParams);
    };
    let reason = msg.arg(1).unwrap_or("net split").to_string();
    if let Some(id) = matrix.servers.get(&irc_to_lower(name)).map(|e| *e.value()) {
        matrix.condemn_link(id, &reason);
    } else {
        // Not directly attached: pass it along.
        let mut out = Outbound::new(
            matrix,
            EventSource::Server(matrix.server_info.name.clone()),
            "SQUIT",
            vec![name.to_string(), reason],
        );
        out.send_to_servers(matrix, Some(link.id));
    }
    Ok(())
}
