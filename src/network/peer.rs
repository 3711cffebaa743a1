//! Peer server links: handshake, burst and the relay read loop.
//!
//! The handshake is a two-line exchange: `PASS <password>` then
//! `SERVER <name> :<description>`. Both sides validate against the
//! configured link block; either side refusing just drops the socket.
//! Once established, this server introduces everything it knows (UID
//! lines, then one SJOIN burst per channel) and settles into relaying.

use crate::config::LinkBlock;
use crate::network::{connection, fanout};
use crate::state::actor::ChannelEvent;
use crate::state::{Link, LinkCaps, LinkKind, Matrix, UserAttach};
use crate::sync::protocol;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{info, warn};
use tsirc_proto::{irc_eq, irc_to_lower, LineCodec, Message, Prefix};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Accept an inbound server connection: peer greets first, we answer.
pub async fn serve_inbound(matrix: Arc<Matrix>, stream: TcpStream, addr: SocketAddr) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LineCodec::new());

    let (password, name) =
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_greeting(&mut lines)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(reason)) => {
                warn!(%addr, %reason, "server handshake failed");
                return;
            }
            Err(_) => {
                warn!(%addr, "server handshake timed out");
                return;
            }
        };

    let Some(block) = matrix
        .config
        .links
        .iter()
        .find(|b| irc_eq(&b.name, &name))
        .cloned()
    else {
        warn!(%addr, peer = %name, "no link block for peer");
        return;
    };
    if block.password != password {
        warn!(%addr, peer = %name, "link password mismatch");
        return;
    }
    if write_greeting(&matrix, &block, &mut write_half).await.is_err() {
        return;
    }
    establish(matrix, block, lines, write_half).await;
}

/// Dial a configured peer: we greet first, then validate their answer.
pub async fn connect(matrix: Arc<Matrix>, block: LinkBlock) {
    info!(peer = %block.name, address = %block.address, "connecting to peer");
    let stream = match TcpStream::connect(&block.address).await {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %block.name, error = %e, "connect failed");
            return;
        }
    };
    let (read_half, mut write_half) = stream.into_split();
    if write_greeting(&matrix, &block, &mut write_half).await.is_err() {
        return;
    }
    let mut lines = FramedRead::new(read_half, LineCodec::new());
    let (password, name) =
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_greeting(&mut lines)).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(reason)) => {
                warn!(peer = %block.name, %reason, "server handshake failed");
                return;
            }
            Err(_) => {
                warn!(peer = %block.name, "server handshake timed out");
                return;
            }
        };
    if !irc_eq(&name, &block.name) || password != block.password {
        warn!(peer = %block.name, presented = %name, "peer failed validation");
        return;
    }
    establish(matrix, block, lines, write_half).await;
}

/// Background dialers for every autoconnect link block. Each retries on
/// a fixed cadence while its peer is not linked.
pub fn spawn_autoconnect(matrix: &Arc<Matrix>) {
    for block in &matrix.config.links {
        if !block.autoconnect || block.address.is_empty() {
            continue;
        }
        let matrix = matrix.clone();
        let block = block.clone();
        tokio::spawn(async move {
            loop {
                if !matrix.servers.contains_key(&irc_to_lower(&block.name)) {
                    connect(matrix.clone(), block.clone()).await;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }
}

/// Collect PASS and SERVER from the wire, in either order.
async fn read_greeting(
    lines: &mut FramedRead<OwnedReadHalf, LineCodec>,
) -> Result<(String, String), String> {
    let mut password: Option<String> = None;
    let mut server: Option<String> = None;
    loop {
        let line = match lines.next().await {
            None => return Err("peer closed during handshake".to_string()),
            Some(Err(e)) => return Err(e.to_string()),
            Some(Ok(line)) => line,
        };
        let Ok(msg) = Message::parse(&line) else {
            continue;
        };
        match msg.command.as_str() {
            "PASS" => password = msg.arg(0).map(str::to_string),
            "SERVER" => server = msg.arg(0).map(str::to_string),
            "ERROR" => {
                return Err(msg.arg(0).unwrap_or("peer sent ERROR").to_string());
            }
            _ => {}
        }
        if let (Some(p), Some(s)) = (&password, &server) {
            return Ok((p.clone(), s.clone()));
        }
    }
}

async fn write_greeting(
    matrix: &Matrix,
    block: &LinkBlock,
    socket: &mut OwnedWriteHalf,
) -> std::io::Result<()> {
    let hello = format!(
        "PASS {}\r\nSERVER {} :{}\r\n",
        block.password, matrix.server_info.name, matrix.server_info.description,
    );
    socket.write_all(hello.as_bytes()).await
}

/// Register the link, burst our state and relay until torn down.
async fn establish(
    matrix: Arc<Matrix>,
    block: LinkBlock,
    mut lines: FramedRead<OwnedReadHalf, LineCodec>,
    write_half: OwnedWriteHalf,
) {
    if matrix.servers.contains_key(&irc_to_lower(&block.name)) {
        warn!(peer = %block.name, "peer already linked, dropping duplicate");
        return;
    }
    let (tx, rx) = mpsc::unbounded_channel();
    let class = matrix.config.class(&block.class);
    let link = Arc::new(Link::new(
        matrix.next_link_id(),
        LinkKind::Server {
            name: block.name.clone(),
        },
        LinkCaps {
            legacy_sjoin: block.legacy_sjoin,
        },
        tx,
        class.sendq,
    ));
    matrix.register_link(link.clone());
    matrix.servers.insert(irc_to_lower(&block.name), link.id);
    tokio::spawn(connection::write_loop(
        matrix.clone(),
        link.clone(),
        write_half,
        rx,
    ));
    info!(
        link = link.id,
        peer = %block.name,
        legacy_sjoin = block.legacy_sjoin,
        "server link established"
    );

    burst(&matrix, &link).await;

    let reason = loop {
        let item = tokio::select! {
            _ = link.closed() => break "connection reset".to_string(),
            item = lines.next() => item,
        };
        let line = match item {
            None => break "peer closed connection".to_string(),
            Some(Err(e)) => break e.to_string(),
            Some(Ok(line)) => line,
        };
        link.touch();
        let Ok(msg) = Message::parse(&line) else {
            continue;
        };
        if let Err(err) = protocol::dispatch(&matrix, &link, msg).await {
            break err.to_string();
        }
    };
    matrix.condemn_link(link.id, &reason);
}

/// Introduce every user we know, then every channel's state.
async fn burst(matrix: &Arc<Matrix>, link: &Arc<Link>) {
    let prefix = Prefix::Server(matrix.server_info.name.clone());
    let users: Vec<_> = matrix.users.iter().map(|u| u.clone()).collect();
    for user in users {
        // Users reached through this very link are the peer's own.
        if matches!(user.attach, UserAttach::Remote { via, .. } if via == link.id) {
            continue;
        }
        let uid_line = Message::with_prefix(
            prefix.clone(),
            "UID",
            vec![user.nick, user.user, user.host, user.ip, user.uid],
        );
        fanout::send_line(matrix, link, &uid_line);
    }
    let channels: Vec<_> = matrix.channels.iter().map(|e| e.value().clone()).collect();
    for tx in channels {
        let _ = tx.send(ChannelEvent::Burst { to: link.id }).await;
    }
}
