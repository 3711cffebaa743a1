//! TS6-style UID generation.
//!
//! A UID is the 3-character server ID followed by six characters drawn
//! from `[A-Z0-9]`, allocated from a monotonically increasing counter.

use std::sync::atomic::{AtomicU64, Ordering};

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generator for unique user identifiers.
#[derive(Debug)]
pub struct UidGenerator {
    sid: String,
    counter: AtomicU64,
}

impl UidGenerator {
    pub fn new(sid: String) -> UidGenerator {
        UidGenerator {
            sid,
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_uid(&self) -> String {
        let mut n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut suffix = [b'A'; 6];
        for slot in suffix.iter_mut().rev() {
            *slot = ALPHABET[(n % 36) as usize];
            n /= 36;
        }
        let mut uid = String::with_capacity(9);
        uid.push_str(&self.sid);
        uid.push_str(std::str::from_utf8(&suffix).expect("alphabet is ascii"));
        uid
    }
}
