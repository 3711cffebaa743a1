//! JOIN: admission checks live in the channel actor; this handler
//! shapes the request and renders the replies.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::state::actor::{ChannelEvent, JoinDenied, JoinOk};
use crate::state::{Member, MemberModes};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tsirc_proto::{is_channel_name, Message};

pub struct JoinHandler;

#[async_trait]
impl Handler for JoinHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(channels) = msg.arg(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let mut keys = msg
            .arg(1)
            .map(|k| k.split(',').map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();

        for channel in channels.split(',').filter(|c| !c.is_empty()) {
            let key = keys.next();
            if !is_channel_name(channel) {
                ctx.numeric(
                    replies::ERR_NOSUCHCHANNEL,
                    vec![channel.to_string(), "No such channel".to_string()],
                );
                continue;
            }
            join_one(ctx, channel, key).await?;
        }
        Ok(())
    }
}

async fn join_one(ctx: &mut Context, channel: &str, key: Option<String>) -> HandlerResult {
    let Some(user) = ctx.matrix.users.get(&ctx.uid).map(|u| u.clone()) else {
        return Err(HandlerError::NotRegistered);
    };
    let member = Member {
        uid: ctx.uid.clone(),
        nick: user.nick.clone(),
        user: user.user.clone(),
        host: user.host.clone(),
        ip: user.ip.clone(),
        modes: MemberModes::default(),
        ban_hits: 0,
        link: Some(ctx.link.clone()),
    };

    let (tx, _created) = ctx.matrix.get_or_create_channel(channel);
    let (reply, rx) = oneshot::channel();
    tx.send(ChannelEvent::Join { member, key, reply })
        .await
        .map_err(|_| HandlerError::Internal("channel mailbox closed".into()))?;
    let outcome = rx
        .await
        .map_err(|_| HandlerError::Internal("channel actor dropped reply".into()))?;

    match outcome {
        Ok(JoinOk { already: true, .. }) => {}
        Ok(ok) => {
            if let Some(topic) = &ok.topic {
                ctx.numeric(
                    replies::RPL_TOPIC,
                    vec![ok.channel.clone(), topic.text.clone()],
                );
                ctx.numeric(
                    replies::RPL_TOPICWHOTIME,
                    vec![
                        ok.channel.clone(),
                        topic.set_by.clone(),
                        topic.set_at.to_string(),
                    ],
                );
            }
            let names: Vec<String> = ok
                .names
                .iter()
                .map(|(sigil, nick)| match sigil {
                    Some(c) => format!("{}{}", c, nick),
                    None => nick.clone(),
                })
                .collect();
            ctx.numeric(
                replies::RPL_NAMREPLY,
                vec!["=".to_string(), ok.channel.clone(), names.join(" ")],
            );
            ctx.numeric(
                replies::RPL_ENDOFNAMES,
                vec![ok.channel.clone(), "End of /NAMES list".to_string()],
            );
        }
        Err(denied) => {
            let (code, text) = match denied {
                JoinDenied::InviteOnly => {
                    (replies::ERR_INVITEONLYCHAN, "Cannot join channel (+i)")
                }
                JoinDenied::BadKey => (replies::ERR_BADCHANNELKEY, "Cannot join channel (+k)"),
                JoinDenied::Full => (replies::ERR_CHANNELISFULL, "Cannot join channel (+l)"),
                JoinDenied::Banned => (replies::ERR_BANNEDFROMCHAN, "Cannot join channel (+b)"),
            };
            ctx.numeric(code, vec![channel.to_string(), text.to_string()]);
        }
    }
    Ok(())
}
