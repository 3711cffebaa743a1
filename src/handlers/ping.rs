//! PING and PONG.

use super::{Context, Handler};
use crate::error::{HandlerError, HandlerResult};
use crate::network::fanout;
use async_trait::async_trait;
use tsirc_proto::{Message, Prefix};

pub struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    fn needs_registration(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &mut Context, msg: &Message) -> HandlerResult {
        let Some(token) = msg.arg(0) else {
            return Err(HandlerError::NeedMoreParams);
        };
        let server = ctx.matrix.server_info.name.clone();
        let pong = Message::with_prefix(
            Prefix::Server(server.clone()),
            "PONG",
            vec![server, token.to_string()],
        );
        fanout::send_line(&ctx.matrix, &ctx.link, &pong);
        Ok(())
    }
}

pub struct PongHandler;

#[async_trait]
impl Handler for PongHandler {
    fn needs_registration(&self) -> bool {
        false
    }

    // Liveness is recorded by the read loop for every inbound line.
    async fn handle(&self, _ctx: &mut Context, _msg: &Message) -> HandlerResult {
        Ok(())
    }
}
