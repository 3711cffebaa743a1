//! Client command dispatch.
//!
//! One handler type per command, registered in a [`Registry`] keyed by
//! the uppercased command word. Handlers receive a mutable [`Context`]
//! describing the connection; everything channel-shaped is forwarded to
//! the owning channel actor rather than mutated here.

mod invite;
mod join;
mod kick;
mod mode;
mod oper;
mod part;
mod ping;
mod privmsg;
mod quit;
mod registration;
pub mod replies;
mod topic;

use crate::error::{HandlerError, HandlerResult};
use crate::state::{Link, Matrix, Uid};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tsirc_proto::Message;

/// Per-connection state threaded through every handler call.
pub struct Context {
    pub matrix: Arc<Matrix>,
    pub link: Arc<Link>,
    /// Allocated at accept time; becomes the user's identity once
    /// registration completes.
    pub uid: Uid,
    pub host: String,
    pub ip: String,
    pub registered: bool,
    pub nick: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
}

impl Context {
    pub fn new(matrix: Arc<Matrix>, link: Arc<Link>, uid: Uid, ip: String) -> Context {
        Context {
            matrix,
            link,
            uid,
            // No resolver: the textual address stands in for the host.
            host: ip.clone(),
            ip,
            registered: false,
            nick: None,
            username: None,
            realname: None,
        }
    }

    /// The nick used in numeric replies; `*` before registration.
    pub fn display_nick(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    pub fn userhost(&self) -> String {
        format!(
            "{}@{}",
            self.username.as_deref().unwrap_or("*"),
            self.host
        )
    }

    /// Send a numeric reply to this connection.
    pub fn numeric(&self, code: &str, params: Vec<String>) {
        replies::numeric(&self.matrix, &self.link, self.display_nick(), code, params);
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult;

    /// Commands accepted before registration completes (NICK, USER,
    /// PING, QUIT) override this.
    fn needs_registration(&self) -> bool {
        true
    }
}

pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Registry {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();
        handlers.insert("NICK", Box::new(registration::NickHandler));
        handlers.insert("USER", Box::new(registration::UserHandler));
        handlers.insert("JOIN", Box::new(join::JoinHandler));
        handlers.insert("PART", Box::new(part::PartHandler));
        handlers.insert("MODE", Box::new(mode::ModeHandler));
        handlers.insert("TOPIC", Box::new(topic::TopicHandler));
        handlers.insert("KICK", Box::new(kick::KickHandler));
        handlers.insert("INVITE", Box::new(invite::InviteHandler));
        handlers.insert("PRIVMSG", Box::new(privmsg::PrivmsgHandler { notice: false }));
        handlers.insert("NOTICE", Box::new(privmsg::PrivmsgHandler { notice: true }));
        handlers.insert("OPER", Box::new(oper::OperHandler));
        handlers.insert("PING", Box::new(ping::PingHandler));
        handlers.insert("PONG", Box::new(ping::PongHandler));
        handlers.insert("QUIT", Box::new(quit::QuitHandler));
        Registry { handlers }
    }

    pub async fn dispatch(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(handler) = self.handlers.get(msg.command.as_str()) else {
            return Err(HandlerError::UnknownCommand(msg.command.clone()));
        };
        if handler.needs_registration() && !ctx.registered {
            return Err(HandlerError::NotRegistered);
        }
        handler.handle(ctx, msg).await
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
