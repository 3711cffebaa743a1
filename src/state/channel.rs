//! Channel-related data types.
//!
//! These are pure data plus simple queries; all mutation happens inside
//! the owning channel actor.

use crate::state::Link;
use std::sync::Arc;

/// Channel topic with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// Argumentless channel mode bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFlags {
    pub invite_only: bool, // +i
    pub moderated: bool,   // +m
    pub no_external: bool, // +n
    pub private: bool,     // +p
    pub secret: bool,      // +s
    pub topic_lock: bool,  // +t
}

impl ChannelFlags {
    /// Bitwise union with another flag set. Equal-TS merges never drop a
    /// bit set on either side.
    pub fn union(self, other: ChannelFlags) -> ChannelFlags {
        ChannelFlags {
            invite_only: self.invite_only || other.invite_only,
            moderated: self.moderated || other.moderated,
            no_external: self.no_external || other.no_external,
            private: self.private || other.private,
            secret: self.secret || other.secret,
            topic_lock: self.topic_lock || other.topic_lock,
        }
    }

    pub fn get(&self, letter: char) -> Option<bool> {
        Some(match letter {
            'i' => self.invite_only,
            'm' => self.moderated,
            'n' => self.no_external,
            'p' => self.private,
            's' => self.secret,
            't' => self.topic_lock,
            _ => return None,
        })
    }

    pub fn set(&mut self, letter: char, value: bool) -> bool {
        match letter {
            'i' => self.invite_only = value,
            'm' => self.moderated = value,
            'n' => self.no_external = value,
            'p' => self.private = value,
            's' => self.secret = value,
            't' => self.topic_lock = value,
            _ => return false,
        }
        true
    }

    fn letters(&self) -> String {
        let mut s = String::new();
        for letter in ['i', 'm', 'n', 'p', 's', 't'] {
            if self.get(letter) == Some(true) {
                s.push(letter);
            }
        }
        s
    }
}

/// Full channel mode state: flag bits plus the parametered pair.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChannelModes {
    pub flags: ChannelFlags,
    pub key: Option<String>,  // +k
    pub limit: Option<u32>,   // +l
}

impl ChannelModes {
    /// Render as a wire mode string plus its ordered arguments, the form
    /// SJOIN carries: `("+ntk", ["sekrit"])`.
    pub fn to_wire(&self) -> (String, Vec<String>) {
        let mut letters = String::from("+");
        letters.push_str(&self.flags.letters());
        let mut args = Vec::new();
        if let Some(key) = &self.key {
            letters.push('k');
            args.push(key.clone());
        }
        if let Some(limit) = self.limit {
            letters.push('l');
            args.push(limit.to_string());
        }
        (letters, args)
    }

    /// Parse the mode string an SJOIN carries. Unknown letters are
    /// skipped; a missing key/limit argument drops that mode.
    pub fn from_wire(letters: &str, args: &[String]) -> ChannelModes {
        let mut modes = ChannelModes::default();
        let mut arg_idx = 0;
        for c in letters.chars() {
            match c {
                '+' => {}
                'k' => {
                    if let Some(key) = args.get(arg_idx) {
                        modes.key = Some(key.clone());
                        arg_idx += 1;
                    }
                }
                'l' => {
                    if let Some(limit) = args.get(arg_idx).and_then(|a| a.parse().ok()) {
                        modes.limit = Some(limit);
                        arg_idx += 1;
                    }
                }
                other => {
                    modes.flags.set(other, true);
                }
            }
        }
        modes
    }
}

/// Per-member privilege flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemberModes {
    pub op: bool,
    pub voice: bool,
    /// Set when a TS merge stripped this member's op. A deopped member
    /// does not count as a defender in later merges.
    pub deopped: bool,
}

impl MemberModes {
    /// Sigils carried in SJOIN member tokens, highest first.
    pub fn sigils(&self) -> String {
        let mut s = String::new();
        if self.op {
            s.push('@');
        }
        if self.voice {
            s.push('+');
        }
        s
    }

    pub fn prefix_char(&self) -> Option<char> {
        if self.op {
            Some('@')
        } else if self.voice {
            Some('+')
        } else {
            None
        }
    }
}

/// Strip leading `@`/`+` sigils from an SJOIN member token.
pub fn split_sigils(token: &str) -> (MemberModes, &str) {
    let mut modes = MemberModes::default();
    let mut rest = token;
    loop {
        match rest.chars().next() {
            Some('@') => {
                modes.op = true;
                rest = &rest[1..];
            }
            Some('+') => {
                modes.voice = true;
                rest = &rest[1..];
            }
            _ => return (modes, rest),
        }
    }
}

/// A channel membership: one (client, channel) pairing.
#[derive(Debug, Clone)]
pub struct Member {
    pub uid: String,
    pub nick: String,
    pub user: String,
    /// DNS-resolved host.
    pub host: String,
    /// Raw IP, matched independently of `host` by the ban component.
    pub ip: String,
    pub modes: MemberModes,
    /// Number of current bans matching this member. Maintained by the
    /// ban component so the message path never rescans the ban list.
    pub ban_hits: u32,
    /// Physical link for locally-attached members; remote members reach
    /// us through their server link instead.
    pub link: Option<Arc<Link>>,
}

impl Member {
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    pub fn ip_mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.ip)
    }

    /// May this member speak given the channel's moderation state?
    /// Banned members (ban_hits > 0) without privilege may not.
    pub fn can_send(&self, moderated: bool) -> bool {
        if self.modes.op || self.modes.voice {
            return true;
        }
        !moderated && self.ban_hits == 0
    }
}
