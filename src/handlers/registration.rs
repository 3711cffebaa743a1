//! NICK and USER: connection registration and post-registration nick
//! changes.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::network::fanout::{EventSource, Outbound};
use crate::state::{User, UserAttach};
use crate::sync::protocol::rename_user;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::info;
use tsirc_proto::{irc_to_lower, Message};

const MAX_NICK_LEN: usize = 30;

fn valid_nick(nick: &str) -> bool {
    if nick.is_empty() || nick.len() > MAX_NICK_LEN {
        return false;
    }
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let first_ok = first.is_ascii_alphabetic() || "[]\\`_^{|}".contains(first);
    first_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || "[]\\`_^{|}-".contains(c))
}

pub struct NickHandler;

#[async_trait]
impl Handler for NickHandler {
    fn needs_registration(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(nick) = msg.arg(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        if !valid_nick(nick) {
            return Err(HandlerError::ErroneousNickname(nick.to_string()));
        }
        if let Some(holder) = ctx.matrix.find_uid_by_nick(nick) {
            if holder != ctx.uid {
                return Err(HandlerError::NicknameInUse(nick.to_string()));
            }
        }

        if ctx.registered {
            let nick = nick.to_string();
            if !rename_user(&ctx.matrix, &ctx.uid, &nick, None).await {
                return Err(HandlerError::NicknameInUse(nick));
            }
            ctx.nick = Some(nick);
            return Ok(());
        }

        ctx.nick = Some(nick.to_string());
        try_complete(ctx);
        Ok(())
    }
}

pub struct UserHandler;

#[async_trait]
impl Handler for UserHandler {
    fn needs_registration(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        if ctx.registered {
            return Err(HandlerError::AlreadyRegistered);
        }
        if msg.params.len() < 4 {
            return Err(HandlerError::NeedMoreParams);
        }
        ctx.username = Some(msg.params[0].clone());
        ctx.realname = Some(msg.params[3].clone());
        try_complete(ctx);
        Ok(())
    }
}

/// Both halves arrived: enter the entity store, greet, and introduce
/// the new user to the network.
fn try_complete(ctx: &mut Context) {
    let (Some(nick), Some(username)) = (ctx.nick.clone(), ctx.username.clone()) else {
        return;
    };

    ctx.matrix.users.insert(
        ctx.uid.clone(),
        User {
            uid: ctx.uid.clone(),
            nick: nick.clone(),
            user: username.clone(),
            host: ctx.host.clone(),
            ip: ctx.ip.clone(),
            oper: false,
            attach: UserAttach::Local(ctx.link.id),
            channels: HashSet::new(),
        },
    );
    ctx.matrix.nicks.insert(irc_to_lower(&nick), ctx.uid.clone());
    ctx.registered = true;

    info!(uid = %ctx.uid, %nick, "client registered");

    let server = &ctx.matrix.server_info;
    ctx.numeric(
        replies::RPL_WELCOME,
        vec![format!(
            "Welcome to the Internet Relay Network {}!{}@{}",
            nick, username, ctx.host
        )],
    );
    ctx.numeric(
        replies::RPL_YOURHOST,
        vec![format!(
            "Your host is {}, running version {}",
            server.name,
            env!("CARGO_PKG_VERSION")
        )],
    );
    ctx.numeric(
        replies::RPL_CREATED,
        vec!["This server was created recently".to_string()],
    );
    ctx.numeric(
        replies::RPL_MYINFO,
        vec![
            server.name.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
            "o".to_string(),
            "imnpstklovb".to_string(),
        ],
    );

    let mut out = Outbound::new(
        &ctx.matrix,
        EventSource::Server(server.name.clone()),
        "UID",
        vec![
            nick,
            username,
            ctx.host.clone(),
            ctx.ip.clone(),
            ctx.uid.clone(),
        ],
    );
    out.send_to_servers(&ctx.matrix, None);
}
