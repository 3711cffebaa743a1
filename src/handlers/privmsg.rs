//! PRIVMSG and NOTICE.
//!
//! The only difference between the two: NOTICE never generates error
//! replies, per the oldest rule in the book.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::ChannelEvent;
use crate::sync::protocol::deliver_user_message;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::{is_channel_name, Message};

pub struct PrivmsgHandler {
    pub notice: bool,
}

#[async_trait]
impl Handler for PrivmsgHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let (Some(target), Some(text)) = (msg.arg(0), msg.arg(1)) else {
            if self.notice {
                return Ok(());
            }
            return Err(HandlerError::NeedMoreParams);
        };

        if is_channel_name(target) {
            let Some(tx) = ctx.matrix.find_channel(target) else {
                if self.notice {
                    return Ok(());
                }
                return Err(HandlerError::NoSuchChannel(target.to_string()));
            };
            let (reply, rx) = oneshot::channel();
            tx.send(ChannelEvent::Privmsg {
                uid: ctx.uid.clone(),
                notice: self.notice,
                text: text.to_string(),
                reply,
            })
            .await
            .map_err(|_| HandlerError::NoSuchChannel(target.to_string()))?;
            let sent = rx
                .await
                .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?;
            if !sent && !self.notice {
                ctx.numeric(
                    replies::ERR_CANNOTSENDTOCHAN,
                    vec![target.to_string(), "Cannot send to channel".to_string()],
                );
            }
            return Ok(());
        }

        let delivered = deliver_user_message(&ctx.matrix, &ctx.uid, target, self.notice, text);
        if !delivered && !self.notice {
            return Err(HandlerError::NoSuchNick(target.to_string()));
        }
        Ok(())
    }
}
