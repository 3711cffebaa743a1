//! TOPIC.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{ChannelEvent, TopicResult};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::Message;

pub struct TopicHandler;

#[async_trait]
impl Handler for TopicHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(channel) = msg.arg(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let Some(tx) = ctx.matrix.find_channel(channel) else {
            return Err(HandlerError::NoSuchChannel(channel.to_string()));
        };
        let (reply, rx) = oneshot::channel();
        tx.send(ChannelEvent::Topic {
            uid: ctx.uid.clone(),
            text: msg.arg(1).map(str::to_string),
            reply,
        })
        .await
        .map_err(|_| HandlerError::NoSuchChannel(channel.to_string()))?;

        match rx
            .await
            .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?
        {
            TopicResult::Set => Ok(()),
            TopicResult::Query(None) => {
                ctx.numeric(
                    replies::RPL_NOTOPIC,
                    vec![channel.to_string(), "No topic is set".to_string()],
                );
                Ok(())
            }
            TopicResult::Query(Some(topic)) => {
                ctx.numeric(
                    replies::RPL_TOPIC,
                    vec![channel.to_string(), topic.text],
                );
                ctx.numeric(
                    replies::RPL_TOPICWHOTIME,
                    vec![channel.to_string(), topic.set_by, topic.set_at.to_string()],
                );
                Ok(())
            }
            TopicResult::NotOnChannel => {
                Err(HandlerError::NotOnChannel(channel.to_string()))
            }
            TopicResult::NotOp => {
                ctx.numeric(
                    replies::ERR_CHANOPRIVSNEEDED,
                    vec![
                        channel.to_string(),
                        "You're not channel operator".to_string(),
                    ],
                );
                Ok(())
            }
        }
    }
}
