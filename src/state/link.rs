//! Physical links and their send queues.
//!
//! Every connection — local client or peer server — is a `Link` keyed by
//! a stable [`LinkId`] issued at accept/connect time, never by a file
//! descriptor. The link owns the outbound byte budget (SendQ) and the
//! fanout dedup stamp.

use crate::error::LinkError;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, Notify};

/// Stable connection identifier.
pub type LinkId = u64;

/// What sits on the other end of a link.
#[derive(Debug, Clone)]
pub enum LinkKind {
    Client { uid: String },
    Server { name: String },
}

/// Capability flags negotiated at link establishment.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCaps {
    /// Peer only understands the dual-timestamp SJOIN form.
    pub legacy_sjoin: bool,
}

/// One physical connection.
///
/// The writer task owns the receiving half of `tx` and drains it FIFO;
/// everything else interacts with the link through `enqueue`.
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub kind: LinkKind,
    pub caps: LinkCaps,
    tx: mpsc::UnboundedSender<Bytes>,
    /// Bytes accepted but not yet flushed to the socket.
    queued: AtomicUsize,
    /// Class-derived SendQ byte limit.
    pub sendq_limit: usize,
    /// Fanout dedup stamp: the last call serial delivered to this link.
    last_serial: AtomicU64,
    /// Set once the link is condemned; enqueues fail from then on.
    doomed: AtomicBool,
    /// Unix time of the last inbound activity, for the ping sweep.
    last_seen: AtomicI64,
    /// Whether a PING probe is outstanding.
    ping_sent: AtomicBool,
    /// Wakes the reader/writer tasks when the link is condemned.
    shutdown: Notify,
}

impl Link {
    pub fn new(
        id: LinkId,
        kind: LinkKind,
        caps: LinkCaps,
        tx: mpsc::UnboundedSender<Bytes>,
        sendq_limit: usize,
    ) -> Link {
        Link {
            id,
            kind,
            caps,
            tx,
            queued: AtomicUsize::new(0),
            sendq_limit,
            last_serial: AtomicU64::new(0),
            doomed: AtomicBool::new(false),
            last_seen: AtomicI64::new(chrono::Utc::now().timestamp()),
            ping_sent: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self.kind, LinkKind::Server { .. })
    }

    /// Queue bytes for delivery, FIFO. Fails fatally when the budget
    /// would be exceeded or the link is already condemned; the caller
    /// condemns the link and moves on — never retries.
    pub fn enqueue(&self, payload: Bytes) -> Result<(), LinkError> {
        if self.doomed.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        let queued = self.queued.fetch_add(payload.len(), Ordering::AcqRel) + payload.len();
        if queued > self.sendq_limit {
            return Err(LinkError::SendQExceeded {
                queued,
                limit: self.sendq_limit,
            });
        }
        self.tx.send(payload).map_err(|_| LinkError::Closed)
    }

    /// Called by the writer task once bytes have reached the socket.
    pub fn flushed(&self, n: usize) {
        self.queued.fetch_sub(n, Ordering::AcqRel);
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Claim this fanout serial. Returns false if the link already
    /// received the payload of the current call.
    pub fn claim_serial(&self, serial: u64) -> bool {
        self.last_serial.swap(serial, Ordering::AcqRel) != serial
    }

    /// Mark the link for teardown. Returns true on the first call so
    /// exactly one party schedules the reaper.
    pub fn condemn(&self) -> bool {
        let first = !self.doomed.swap(true, Ordering::AcqRel);
        self.shutdown.notify_waiters();
        first
    }

    pub fn is_doomed(&self) -> bool {
        self.doomed.load(Ordering::Acquire)
    }

    /// Resolves once the link is condemned. Safe against the notify
    /// racing the doomed flag.
    pub async fn closed(&self) {
        let mut notified = std::pin::pin!(self.shutdown.notified());
        notified.as_mut().enable();
        if self.is_doomed() {
            return;
        }
        notified.await;
    }

    pub fn touch(&self) {
        self.last_seen
            .store(chrono::Utc::now().timestamp(), Ordering::Release);
        self.ping_sent.store(false, Ordering::Release);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn set_last_seen_for_test(&self, ts: i64) {
        self.last_seen.store(ts, Ordering::Release);
    }

    /// Record that a PING probe went out. Returns true on the first
    /// probe since the last inbound activity.
    pub fn mark_pinged(&self) -> bool {
        !self.ping_sent.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_link(limit: usize) -> (Link, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Link::new(
            1,
            LinkKind::Client { uid: "0ABAAAAAA".into() },
            LinkCaps::default(),
            tx,
            limit,
        );
        (link, rx)
    }

    #[test]
    fn enqueue_respects_budget() {
        let (link, mut rx) = test_link(10);
        link.enqueue(Bytes::from_static(b"12345")).unwrap();
        link.enqueue(Bytes::from_static(b"12345")).unwrap();
        // Third write busts the 10-byte budget: fatal, nothing queued.
        let err = link.enqueue(Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, LinkError::SendQExceeded { queued: 11, limit: 10 }));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"12345"));
    }

    #[test]
    fn flush_frees_budget() {
        let (link, _rx) = test_link(10);
        link.enqueue(Bytes::from_static(b"0123456789")).unwrap();
        link.flushed(10);
        assert_eq!(link.queued_bytes(), 0);
        link.enqueue(Bytes::from_static(b"again")).unwrap();
    }

    #[test]
    fn condemned_link_rejects_enqueue() {
        let (link, _rx) = test_link(100);
        assert!(link.condemn());
        assert!(!link.condemn());
        assert!(matches!(
            link.enqueue(Bytes::from_static(b"late")),
            Err(LinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn closed_resolves_even_when_condemned_first() {
        let (link, _rx) = test_link(10);
        link.condemn();
        link.closed().await;
    }

    #[test]
    fn serial_claim_is_once_per_value() {
        let (link, _rx) = test_link(100);
        assert!(link.claim_serial(7));
        assert!(!link.claim_serial(7));
        assert!(link.claim_serial(8));
    }
}
