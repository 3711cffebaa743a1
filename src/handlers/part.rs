//! PART.

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::ChannelEvent;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::Message;

pub struct PartHandler;

#[async_trait]
impl Handler for PartHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(channels) = msg.arg(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let message = msg.arg(1).map(str::to_string);

        for channel in channels.split(',').filter(|c| !c.is_empty()) {
            let Some(tx) = ctx.matrix.find_channel(channel) else {
                return Err(HandlerError::NoSuchChannel(channel.to_string()));
            };
            let (reply, rx) = oneshot::channel();
            tx.send(ChannelEvent::Part {
                uid: ctx.uid.clone(),
                message: message.clone(),
                reply,
            })
            .await
            .map_err(|_| HandlerError::NoSuchChannel(channel.to_string()))?;
            let was_member = rx
                .await
                .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?;
            if !was_member {
                return Err(HandlerError::NotOnChannel(channel.to_string()));
            }
        }
        Ok(())
    }
}
