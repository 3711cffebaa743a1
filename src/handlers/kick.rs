//! KICK.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{ChannelEvent, KickDenied};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::Message;

pub struct KickHandler;

#[async_trait]
impl Handler for KickHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let (Some(channel), Some(target)) = (msg.arg(0), msg.arg(1)) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let Some(tx) = ctx.matrix.find_channel(channel) else {
            return Err(HandlerError::NoSuchChannel(channel.to_string()));
        };
        let reason = msg.arg(2).unwrap_or(target).to_string();
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Kick {
            by: ctx.uid.clone(),
            target: target.to_string(),
            reason,
            reply,
        })
        .await
        .map_err(|_| HandlerError::NoSuchChannel(channel.to_string()))?;

        match rx
            .await
            .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?
        {
            Ok(()) => Ok(()),
            Err(KickDenied::NotOnChannel) => {
                Err(HandlerError::NotOnChannel(channel.to_string()))
            }
            Err(KickDenied::NotOp) => {
                ctx.numeric(
                    replies::ERR_CHANOPRIVSNEEDED,
                    vec![
                        channel.to_string(),
                        "You're not channel operator".to_string(),
                    ],
                );
                Ok(())
            }
            Err(KickDenied::TargetAbsent) => {
                ctx.numeric(
                    replies::ERR_USERNOTINCHANNEL,
                    vec![
                        target.to_string(),
                        channel.to_string(),
                        "They aren't on that channel".to_string(),
                    ],
                );
                Ok(())
            }
        }
    }
}
