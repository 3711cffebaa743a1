//! QUIT.

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use async_trait::async_trait;
use tsirc_proto::Message;

pub struct QuitHandler;

#[async_trait]
impl Handler for QuitHandler {
    fn needs_registration(&self) -> bool {
        false
    }

    async fn handle(&self, _ctx: &mut Context, msg: &Message) -> HandlerResult {
        Err(HandlerError::Quit(msg.arg(0).map(str::to_string)))
    }
}
