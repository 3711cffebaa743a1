//! Shared fixtures for in-crate tests.

#![allow(dead_code)]

use crate::config::{Config, ListenConfig, ServerConfig};
use crate::state::{Condemned, Link, LinkCaps, LinkKind, Matrix, Uid, User, UserAttach};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tsirc_proto::irc_to_lower;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            name: "irc.test.net".into(),
            sid: "0AB".into(),
            description: "test".into(),
        },
        listen: ListenConfig::default(),
        limits: Default::default(),
        classes: vec![],
        links: vec![],
        opers: vec![],
    }
}

pub fn test_matrix() -> (Arc<Matrix>, mpsc::UnboundedReceiver<Condemned>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Matrix::new(test_config(), tx), rx)
}

fn attach(
    matrix: &Arc<Matrix>,
    kind: LinkKind,
    sendq: usize,
) -> (Arc<Link>, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let link = Arc::new(Link::new(
        matrix.next_link_id(),
        kind,
        LinkCaps::default(),
        tx,
        sendq,
    ));
    matrix.register_link(link.clone());
    (link, rx)
}

pub fn attach_client(
    matrix: &Arc<Matrix>,
    uid: &str,
    sendq: usize,
) -> (Arc<Link>, mpsc::UnboundedReceiver<Bytes>) {
    attach(matrix, LinkKind::Client { uid: uid.into() }, sendq)
}

pub fn attach_server(
    matrix: &Arc<Matrix>,
    name: &str,
    sendq: usize,
) -> (Arc<Link>, mpsc::UnboundedReceiver<Bytes>) {
    let (link, rx) = attach(matrix, LinkKind::Server { name: name.into() }, sendq);
    matrix.servers.insert(irc_to_lower(name), link.id);
    (link, rx)
}

/// Register a locally-attached user and return its UID. The link's
/// `LinkKind::Client` uid is not consulted; tests wire the registry the
/// way the registration handler would.
pub fn add_local_user(matrix: &Arc<Matrix>, link: &Link, nick: &str) -> Uid {
    let uid = matrix.uid_gen.next_uid();
    matrix.users.insert(
        uid.clone(),
        User {
            uid: uid.clone(),
            nick: nick.into(),
            user: nick.into(),
            host: format!("{}.example.net", nick),
            ip: "192.0.2.10".into(),
            oper: false,
            attach: UserAttach::Local(link.id),
            channels: HashSet::new(),
        },
    );
    matrix.nicks.insert(irc_to_lower(nick), uid.clone());
    uid
}

/// Register a user introduced by a peer server.
pub fn add_remote_user(matrix: &Arc<Matrix>, via: &Link, server: &str, nick: &str) -> Uid {
    let uid = matrix.uid_gen.next_uid();
    matrix.users.insert(
        uid.clone(),
        User {
            uid: uid.clone(),
            nick: nick.into(),
            user: nick.into(),
            host: format!("{}.example.org", nick),
            ip: "198.51.100.7".into(),
            oper: false,
            attach: UserAttach::Remote {
                via: via.id,
                server: server.into(),
            },
            channels: HashSet::new(),
        },
    );
    matrix.nicks.insert(irc_to_lower(nick), uid.clone());
    uid
}

/// Drain a link's outbound queue into decoded strings (CRLF stripped).
pub fn drain_lines(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        let s = String::from_utf8_lossy(&bytes);
        out.push(s.trim_end_matches(['\r', '\n']).to_string());
    }
    out
}
