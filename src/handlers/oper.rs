//! OPER.

use super::{replies, Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use async_trait::async_trait;
use tracing::{info, warn};
use tsirc_proto::Message;

pub struct OperHandler;

#[async_trait]
impl Handler for OperHandler {
    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let (Some(name), Some(password)) = (msg.arg(0), msg.arg(1)) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let userhost = ctx.userhost();
        let accepted = ctx
            .matrix
            .config
            .opers
            .iter()
            .any(|block| block.accepts(name, password, &userhost));
        if !accepted {
            warn!(%name, %userhost, "failed OPER attempt");
            ctx.numeric(
                replies::ERR_PASSWDMISMATCH,
                vec!["Password incorrect".to_string()],
            );
            return Ok(());
        }

        if let Some(mut user) = ctx.matrix.users.get_mut(&ctx.uid) {
            user.oper = true;
        }
        info!(%name, uid = %ctx.uid, "operator authenticated");
        ctx.numeric(
            replies::RPL_YOUREOPER,
            vec!["You are now an IRC operator".to_string()],
        );
        Ok(())
    }
}
