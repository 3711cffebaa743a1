//! Multi-destination message fanout.
//!
//! One logical event (a JOIN, a mode change, a reconciled SJOIN) must
//! reach a computed destination set — channel members, all peer
//! servers, local operators — with each physical link receiving the
//! bytes exactly once, even when the selections overlap.
//!
//! Mechanism: every call takes a fresh serial from the Matrix; each
//! link carries a "last serial delivered" stamp and is skipped when it
//! already claimed the current serial. Payloads are rendered lazily, at
//! most once per prefix style, into a ref-counted [`Bytes`] buffer
//! shared by every link that needs that exact byte sequence.
//!
//! A failed enqueue (SendQ overflow, closed link) condemns the link and
//! delivery continues to the remaining destinations — a fanout call
//! never leaves some healthy links silently unserved.

use crate::state::{Link, LinkId, Matrix};
use bytes::Bytes;
use std::sync::Arc;
use tsirc_proto::{Message, Prefix};

/// Render a message to its on-wire bytes (CRLF-terminated).
pub fn line_bytes(msg: &Message) -> Bytes {
    Bytes::from(format!("{}\r\n", msg))
}

/// Send a single message to one link, bypassing dedup (used for direct
/// replies). Condemns the link on failure.
pub fn send_line(matrix: &Matrix, link: &Link, msg: &Message) {
    if link.is_doomed() {
        return;
    }
    if let Err(e) = link.enqueue(line_bytes(msg)) {
        matrix.condemn_link(link.id, &e.to_string());
    }
}

/// One logical fanout event's delivery scope.
pub struct FanoutCall {
    serial: u64,
}

impl FanoutCall {
    pub fn begin(matrix: &Matrix) -> FanoutCall {
        FanoutCall {
            serial: matrix.next_fanout_serial(),
        }
    }

    /// Adopt a serial allocated elsewhere. Lets one logical event span
    /// several channel actors (a QUIT touching every channel the user
    /// was in) while still reaching each shared link once.
    pub fn with_serial(serial: u64) -> FanoutCall {
        FanoutCall { serial }
    }

    /// Deliver pre-rendered lines to one link, at most once per call.
    /// Returns false if the link had already been served or is doomed.
    pub fn deliver_lines(&self, matrix: &Matrix, link: &Link, payloads: &[Bytes]) -> bool {
        if link.is_doomed() || !link.claim_serial(self.serial) {
            return false;
        }
        for payload in payloads {
            if let Err(e) = link.enqueue(payload.clone()) {
                matrix.condemn_link(link.id, &e.to_string());
                return false;
            }
        }
        true
    }
}

/// The origin stamped onto a fanned-out message.
#[derive(Debug, Clone)]
pub enum EventSource {
    /// A user event; clients see `nick!user@host`, servers see the
    /// bare nick.
    User {
        nick: String,
        user: String,
        host: String,
    },
    /// A server event; everyone sees the server name.
    Server(String),
}

/// Prefix renderings a single event may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefixStyle {
    UserFull = 0,
    UserNick = 1,
    ServerName = 2,
}

/// One payload bound for many links.
///
/// Holds the un-rendered event and a per-style cache; rendering happens
/// on the first link that needs each style and the resulting buffer is
/// shared (`Bytes` clones are reference bumps) until the call ends.
pub struct Outbound {
    call: FanoutCall,
    source: EventSource,
    command: String,
    params: Vec<String>,
    rendered: [Option<Bytes>; 3],
}

impl Outbound {
    pub fn new(
        matrix: &Matrix,
        source: EventSource,
        command: &str,
        params: Vec<String>,
    ) -> Outbound {
        Outbound {
            call: FanoutCall::begin(matrix),
            source,
            command: command.to_string(),
            params,
            rendered: [None, None, None],
        }
    }

    /// Like [`Outbound::new`] but joined to an already-allocated serial.
    pub fn for_serial(
        serial: u64,
        source: EventSource,
        command: &str,
        params: Vec<String>,
    ) -> Outbound {
        Outbound {
            call: FanoutCall::with_serial(serial),
            source,
            command: command.to_string(),
            params,
            rendered: [None, None, None],
        }
    }

    fn style_for(&self, link: &Link) -> PrefixStyle {
        match (&self.source, link.is_server()) {
            (EventSource::User { .. }, false) => PrefixStyle::UserFull,
            (EventSource::User { .. }, true) => PrefixStyle::UserNick,
            (EventSource::Server(_), _) => PrefixStyle::ServerName,
        }
    }

    fn rendered_for(&mut self, style: PrefixStyle) -> Bytes {
        let slot = style as usize;
        if let Some(bytes) = &self.rendered[slot] {
            return bytes.clone();
        }
        let prefix = match (&self.source, style) {
            (EventSource::User { nick, user, host }, PrefixStyle::UserFull) => Prefix::User {
                nick: nick.clone(),
                user: user.clone(),
                host: host.clone(),
            },
            (EventSource::User { nick, .. }, _) => Prefix::User {
                nick: nick.clone(),
                user: String::new(),
                host: String::new(),
            },
            (EventSource::Server(name), _) => Prefix::Server(name.clone()),
        };
        let msg = Message::with_prefix(prefix, &self.command, self.params.clone());
        let bytes = line_bytes(&msg);
        self.rendered[slot] = Some(bytes.clone());
        bytes
    }

    /// Mark a link as already served without sending anything — the
    /// speaker of a PRIVMSG never hears their own words back.
    pub fn skip(&self, link: &Link) {
        link.claim_serial(self.call.serial);
    }

    /// Deliver to one link, deduplicated by the call serial.
    pub fn send(&mut self, matrix: &Matrix, link: &Link) {
        if link.is_doomed() || !link.claim_serial(self.call.serial) {
            return;
        }
        let payload = self.rendered_for(self.style_for(link));
        if let Err(e) = link.enqueue(payload) {
            matrix.condemn_link(link.id, &e.to_string());
        }
    }

    /// Deliver to a snapshot of links.
    pub fn send_to<'a>(
        &mut self,
        matrix: &Matrix,
        links: impl IntoIterator<Item = &'a Arc<Link>>,
    ) {
        for link in links {
            self.send(matrix, link);
        }
    }

    /// Deliver to every live peer server link, except the origin.
    pub fn send_to_servers(&mut self, matrix: &Matrix, except: Option<LinkId>) {
        for link in matrix.server_links(except) {
            self.send(matrix, &link);
        }
    }

    /// Deliver to every locally-connected operator.
    pub fn send_to_local_opers(&mut self, matrix: &Matrix) {
        for link in matrix.local_oper_links() {
            self.send(matrix, &link);
        }
    }
}

/// Fan a server NOTICE to local operators (desync warnings and the
/// like).
pub fn notice_opers(matrix: &Matrix, text: &str) {
    let mut out = Outbound::new(
        matrix,
        EventSource::Server(matrix.server_info.name.clone()),
        "NOTICE",
        vec!["*".to_string(), text.to_string()],
    );
    out.send_to_local_opers(matrix);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{attach_client, attach_server, test_matrix};

    #[tokio::test]
    async fn overlapping_selections_deliver_once() {
        let (matrix, _reaper) = test_matrix();
        let (server, mut rx) = attach_server(&matrix, "hub.test.net", 4096);

        let mut out = Outbound::new(
            &matrix,
            EventSource::User {
                nick: "alice".into(),
                user: "a".into(),
                host: "h".into(),
            },
            "JOIN",
            vec!["#x".into()],
        );
        // The same physical link is reachable through both the explicit
        // snapshot and the all-servers selection.
        out.send(&matrix, &server);
        out.send_to_servers(&matrix, None);

        assert_eq!(&rx.try_recv().unwrap()[..], b":alice JOIN #x\r\n");
        assert!(rx.try_recv().is_err(), "second copy delivered");
    }

    #[tokio::test]
    async fn distinct_calls_deliver_again() {
        let (matrix, _reaper) = test_matrix();
        let (server, mut rx) = attach_server(&matrix, "hub.test.net", 4096);

        for _ in 0..2 {
            let mut out = Outbound::new(
                &matrix,
                EventSource::Server("irc.test.net".into()),
                "PING",
                vec!["irc.test.net".into()],
            );
            out.send(&matrix, &server);
        }
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn renders_once_per_prefix_style() {
        let (matrix, _reaper) = test_matrix();
        let (client_a, mut rx_a) = attach_client(&matrix, "0ABAAAAAA", 4096);
        let (client_b, mut rx_b) = attach_client(&matrix, "0ABAAAAAB", 4096);
        let (server, mut rx_s) = attach_server(&matrix, "hub.test.net", 4096);

        let mut out = Outbound::new(
            &matrix,
            EventSource::User {
                nick: "alice".into(),
                user: "a".into(),
                host: "h.net".into(),
            },
            "PART",
            vec!["#x".into()],
        );
        out.send(&matrix, &client_a);
        out.send(&matrix, &client_b);
        out.send(&matrix, &server);

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert_eq!(&a[..], b":alice!a@h.net PART #x\r\n");
        // Same rendered buffer shared between both clients.
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(&rx_s.try_recv().unwrap()[..], b":alice PART #x\r\n");
    }

    #[tokio::test]
    async fn sendq_overflow_condemns_but_delivery_continues() {
        let (matrix, mut reaper) = test_matrix();
        let (slow, _rx_slow) = attach_client(&matrix, "0ABAAAAAA", 4);
        let (healthy, mut rx_ok) = attach_client(&matrix, "0ABAAAAAB", 4096);

        let mut out = Outbound::new(
            &matrix,
            EventSource::Server("irc.test.net".into()),
            "NOTICE",
            vec!["*".into(), "big payload".into()],
        );
        out.send(&matrix, &slow);
        out.send(&matrix, &healthy);

        // The slow link was condemned, not retried.
        let condemned = reaper.try_recv().unwrap();
        assert_eq!(condemned.link, slow.id);
        assert!(slow.is_doomed());
        // The healthy link still got its copy.
        assert!(rx_ok.try_recv().is_ok());
    }

    #[tokio::test]
    async fn prerendered_lines_are_deduped_per_call() {
        let (matrix, _reaper) = test_matrix();
        let (server, mut rx) = attach_server(&matrix, "hub.test.net", 4096);

        let call = FanoutCall::begin(&matrix);
        let lines = vec![Bytes::from_static(b"a\r\n"), Bytes::from_static(b"b\r\n")];
        assert!(call.deliver_lines(&matrix, &server, &lines));
        assert!(!call.deliver_lines(&matrix, &server, &lines));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
