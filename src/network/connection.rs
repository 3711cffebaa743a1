//! Local client connections.
//!
//! Each accepted client gets two tasks: a reader (this module's `serve`)
//! that frames lines and routes them through the handler registry, and a
//! writer that drains the link's send queue onto the socket. Fatal
//! handler errors condemn the link; the reaper finishes the teardown.

use crate::error::HandlerError;
use crate::handlers::{replies, Context, Registry};
use crate::state::{Link, LinkCaps, LinkKind, Matrix};
use bytes::Bytes;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info};
use tsirc_proto::{LineCodec, Message};

/// Serve one client connection until it quits or is condemned.
pub async fn serve(
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    // The UID is allocated before registration so the link can carry
    // its owner's identity from the first byte.
    let uid = matrix.uid_gen.next_uid();
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let class = matrix.config.class("default");
    let link = Arc::new(Link::new(
        matrix.next_link_id(),
        LinkKind::Client { uid: uid.clone() },
        LinkCaps::default(),
        tx,
        class.sendq,
    ));
    matrix.register_link(link.clone());
    tokio::spawn(write_loop(matrix.clone(), link.clone(), write_half, rx));
    info!(link = link.id, %addr, %uid, "client connected");

    let mut ctx = Context::new(matrix.clone(), link.clone(), uid, addr.ip().to_string());
    let mut lines = FramedRead::new(read_half, LineCodec::new());
    let reason = read_loop(&mut ctx, &registry, &mut lines).await;
    matrix.condemn_link(link.id, &reason);
}

/// Read and dispatch lines until something ends the connection. The
/// return value becomes the quit reason the rest of the network sees.
async fn read_loop(
    ctx: &mut Context,
    registry: &Registry,
    lines: &mut FramedRead<OwnedReadHalf, LineCodec>,
) -> String {
    loop {
        let item = tokio::select! {
            _ = ctx.link.closed() => return "connection reset".to_string(),
            item = lines.next() => item,
        };
        let line = match item {
            None => return "client closed connection".to_string(),
            Some(Err(e)) => return e.to_string(),
            Some(Ok(line)) => line,
        };
        ctx.link.touch();
        let Ok(msg) = Message::parse(&line) else {
            continue;
        };
        match registry.dispatch(ctx, &msg).await {
            Ok(()) => {}
            Err(HandlerError::Quit(message)) => {
                return match message {
                    Some(m) => format!("Quit: {}", m),
                    None => "Quit".to_string(),
                };
            }
            Err(err) if err.is_fatal() => return err.to_string(),
            Err(err) => {
                debug!(
                    link = ctx.link.id,
                    command = %msg.command,
                    code = err.error_code(),
                    "command rejected"
                );
                reply_error(ctx, &msg.command, &err);
            }
        }
    }
}

/// Map a non-fatal handler error to its numeric reply.
fn reply_error(ctx: &Context, command: &str, err: &HandlerError) {
    use replies::*;
    let (code, params) = match err {
        HandlerError::NeedMoreParams => (
            ERR_NEEDMOREPARAMS,
            vec![command.to_string(), "Not enough parameters".to_string()],
        ),
        HandlerError::NotRegistered => (
            ERR_NOTREGISTERED,
            vec!["You have not registered".to_string()],
        ),
        HandlerError::AlreadyRegistered => (
            ERR_ALREADYREGISTERED,
            vec!["You may not reregister".to_string()],
        ),
        HandlerError::NicknameInUse(nick) => (
            ERR_NICKNAMEINUSE,
            vec![nick.clone(), "Nickname is already in use".to_string()],
        ),
        HandlerError::ErroneousNickname(nick) => (
            ERR_ERRONEUSNICKNAME,
            vec![nick.clone(), "Erroneous nickname".to_string()],
        ),
        HandlerError::NoSuchChannel(name) => (
            ERR_NOSUCHCHANNEL,
            vec![name.clone(), "No such channel".to_string()],
        ),
        HandlerError::NoSuchNick(nick) => (
            ERR_NOSUCHNICK,
            vec![nick.clone(), "No such nick/channel".to_string()],
        ),
        HandlerError::NotOnChannel(name) => (
            ERR_NOTONCHANNEL,
            vec![name.clone(), "You're not on that channel".to_string()],
        ),
        HandlerError::UnknownCommand(cmd) => (
            ERR_UNKNOWNCOMMAND,
            vec![cmd.clone(), "Unknown command".to_string()],
        ),
        HandlerError::Internal(detail) => {
            error!(link = ctx.link.id, %detail, "internal error handling command");
            return;
        }
        // Fatal variants never reach here; the read loop returns first.
        HandlerError::Quit(_) | HandlerError::Link(_) => return,
    };
    ctx.numeric(code, params);
}

/// Drain the link's send queue onto the socket. Shared by client and
/// peer connections.
///
/// Once the link is condemned, whatever was queued before the verdict
/// is still flushed (QUIT numerics, the final ERROR) and the socket is
/// shut down.
pub(crate) async fn write_loop(
    matrix: Arc<Matrix>,
    link: Arc<Link>,
    mut socket: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) {
    loop {
        tokio::select! {
            _ = link.closed() => break,
            queued = rx.recv() => match queued {
                None => return,
                Some(bytes) => {
                    if socket.write_all(&bytes).await.is_err() {
                        matrix.condemn_link(link.id, "write error");
                        return;
                    }
                    link.flushed(bytes.len());
                }
            },
        }
    }
    while let Ok(bytes) = rx.try_recv() {
        if socket.write_all(&bytes).await.is_err() {
            return;
        }
        link.flushed(bytes.len());
    }
    let _ = socket.write_all(b"ERROR :Closing link\r\n").await;
    let _ = socket.shutdown().await;
}
