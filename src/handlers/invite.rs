//! INVITE.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{ChannelEvent, InviteDenied};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::Message;

pub struct InviteHandler;

#[async_trait]
impl Handler for InviteHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let (Some(nick), Some(channel)) = (msg.arg(0), msg.arg(1)) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let Some(target) = ctx.matrix.find_uid_by_nick(nick) else {
            return Err(HandlerError::NoSuchNick(nick.to_string()));
        };
        let Some(tx) = ctx.matrix.find_channel(channel) else {
            return Err(HandlerError::NoSuchChannel(channel.to_string()));
        };
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Invite {
            by: ctx.uid.clone(),
            target,
            reply,
        })
        .await
        .map_err(|_| HandlerError::NoSuchChannel(channel.to_string()))?;

        match rx
            .await
            .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?
        {
            Ok(()) => {
                ctx.numeric(
                    replies::RPL_INVITING,
                    vec![nick.to_string(), channel.to_string()],
                );
                Ok(())
            }
            Err(InviteDenied::NotOnChannel) => {
                Err(HandlerError::NotOnChannel(channel.to_string()))
            }
            Err(InviteDenied::NotOp) => {
                ctx.numeric(
                    replies::ERR_CHANOPRIVSNEEDED,
                    vec![
                        channel.to_string(),
                        "You're not channel operator".to_string(),
                    ],
                );
                Ok(())
            }
            Err(InviteDenied::AlreadyOnChannel) => {
                ctx.numeric(
                    replies::ERR_USERONCHANNEL,
                    vec![
                        nick.to_string(),
                        channel.to_string(),
                        "is already on channel".to_string(),
                    ],
                );
                Ok(())
            }
        }
    }
}
