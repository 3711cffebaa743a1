//! MODE: queries, ban list queries, and change requests.
//!
//! The channel actor applies the delta and reports what happened; this
//! handler turns the latched error flags into at most one numeric each.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{ChannelEvent, ModeOrigin};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::{is_channel_name, Message};

pub struct ModeHandler;

#[async_trait]
impl Handler for ModeHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(target) = msg.arg(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        if !is_channel_name(target) {
            // User modes: only the trivial self-query is supported.
            ctx.numeric(replies::RPL_UMODEIS, vec!["+".to_string()]);
            return Ok(());
        }
        let Some(tx) = ctx.matrix.find_channel(target) else {
            return Err(HandlerError::NoSuchChannel(target.to_string()));
        };

        let tokens = msg.arg(1).unwrap_or("");
        if tokens.is_empty() {
            let (reply, rx) = oneshot::channel();
            let _ = tx.send(ChannelEvent::ModeQuery { reply }).await;
            if let Ok((letters, args, ts)) = rx.await {
                let mut params = vec![target.to_string(), letters];
                params.extend(args);
                ctx.numeric(replies::RPL_CHANNELMODEIS, params);
                ctx.numeric(
                    replies::RPL_CREATIONTIME,
                    vec![target.to_string(), ts.to_string()],
                );
            }
            return Ok(());
        }

        // A bare `+b` lists the ban list instead of changing anything.
        if matches!(tokens, "b" | "+b") && msg.params.len() == 2 {
            let (reply, rx) = oneshot::channel();
            let _ = tx.send(ChannelEvent::ListBans { reply }).await;
            if let Ok(bans) = rx.await {
                for ban in bans {
                    ctx.numeric(
                        replies::RPL_BANLIST,
                        vec![
                            target.to_string(),
                            ban.mask,
                            ban.set_by,
                            ban.set_at.to_string(),
                        ],
                    );
                }
                ctx.numeric(
                    replies::RPL_ENDOFBANLIST,
                    vec![
                        target.to_string(),
                        "End of channel ban list".to_string(),
                    ],
                );
            }
            return Ok(());
        }

        let user = ctx
            .matrix
            .users
            .get(&ctx.uid)
            .map(|u| u.clone())
            .ok_or(HandlerError::NotRegistered)?;
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Mode {
            origin: ModeOrigin::Member {
                uid: ctx.uid.clone(),
                nick: user.nick,
                user: user.user,
                host: user.host,
            },
            tokens: tokens.to_string(),
            args: msg.params[2..].to_vec(),
            reply: Some(reply),
        })
        .await
        .map_err(|_| HandlerError::NoSuchChannel(target.to_string()))?;
        let outcome = rx
            .await
            .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?;

        // Each latched condition surfaces exactly once per request.
        if outcome.privs_rejected {
            ctx.numeric(
                replies::ERR_CHANOPRIVSNEEDED,
                vec![
                    target.to_string(),
                    "You're not channel operator".to_string(),
                ],
            );
        }
        if outcome.missing_param {
            ctx.numeric(
                replies::ERR_NEEDMOREPARAMS,
                vec!["MODE".to_string(), "Not enough parameters".to_string()],
            );
        }
        for letter in outcome.unknown {
            ctx.numeric(
                replies::ERR_UNKNOWNMODE,
                vec![
                    letter.to_string(),
                    "is unknown mode char to me".to_string(),
                ],
            );
        }
        Ok(())
    }
}
