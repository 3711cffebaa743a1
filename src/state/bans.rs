//! Channel ban entries.
//!
//! A ban is classified once at insertion time by the structure of its
//! mask; the classification exists purely to bound matching cost — a
//! host-only ban never inspects nicks, a user@host ban never inspects
//! the wildcard nick.

use tsirc_proto::match_mask;

/// Structural classification of a ban mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanClass {
    /// `nick!user@host` with a concrete nick portion.
    Full,
    /// `*!user@host` — the nick is a pure wildcard.
    UserHost,
    /// `*!*@host` — only the host portion discriminates.
    HostOnly,
}

/// One entry in a channel's ban list.
#[derive(Debug, Clone)]
pub struct Ban {
    pub mask: String,
    pub class: BanClass,
    pub set_by: String,
    pub set_at: i64,
}

/// Split a mask into (nick, user, host) parts, each defaulting to `*`.
/// A bare token with neither `!` nor `@` is a nick mask.
fn split_mask(mask: &str) -> (&str, &str, &str) {
    match mask.split_once('!') {
        Some((nick, rest)) => {
            let (user, host) = rest.split_once('@').unwrap_or((rest, "*"));
            (nick, user, host)
        }
        None => match mask.split_once('@') {
            Some((user, host)) => ("*", user, host),
            None => (mask, "*", "*"),
        },
    }
}

impl Ban {
    pub fn new(mask: &str, set_by: &str, set_at: i64) -> Ban {
        let (nick, user, _) = split_mask(mask);
        let class = if nick == "*" && user == "*" {
            BanClass::HostOnly
        } else if nick == "*" {
            BanClass::UserHost
        } else {
            BanClass::Full
        };
        Ban {
            mask: mask.to_string(),
            class,
            set_by: set_by.to_string(),
            set_at,
        }
    }

    /// Does this ban hit `nick!user@host`? The caller passes the parts
    /// separately so the classified fast paths can skip work.
    pub fn hits(&self, nick: &str, user: &str, host: &str) -> bool {
        let (mask_nick, mask_user, mask_host) = split_mask(&self.mask);
        match self.class {
            BanClass::HostOnly => match_mask(mask_host, host),
            BanClass::UserHost => match_mask(mask_user, user) && match_mask(mask_host, host),
            BanClass::Full => {
                match_mask(mask_nick, nick)
                    && match_mask(mask_user, user)
                    && match_mask(mask_host, host)
            }
        }
    }
}

/// True if any existing ban already covers `mask` — tested by matching
/// each existing entry against the new mask as a literal string. The
/// reverse direction is deliberately unchecked: a broader new ban does
/// not evict narrower entries already listed.
pub fn covered(bans: &[Ban], mask: &str) -> bool {
    bans.iter().any(|b| match_mask(&b.mask, mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_structure() {
        assert_eq!(Ban::new("*!*@evil.example", "x", 0).class, BanClass::HostOnly);
        assert_eq!(Ban::new("*!bad@*.example", "x", 0).class, BanClass::UserHost);
        assert_eq!(Ban::new("bob!*@*", "x", 0).class, BanClass::Full);
        // A bare host with no ! or @ still parses.
        assert_eq!(Ban::new("troll", "x", 0).class, BanClass::Full);
    }

    #[test]
    fn bare_nick_mask_matches_the_nick() {
        let ban = Ban::new("troll", "oper", 0);
        assert!(ban.hits("troll", "ident", "host.example"));
        // The nick portion never leaks into the ident comparison.
        assert!(!ban.hits("innocent", "troll", "host.example"));
    }

    #[test]
    fn host_only_ignores_nick_and_user() {
        let ban = Ban::new("*!*@*.evil.example", "oper", 0);
        assert!(ban.hits("anyone", "anything", "gw.evil.example"));
        assert!(!ban.hits("anyone", "anything", "good.example"));
    }

    #[test]
    fn full_mask_checks_all_parts() {
        let ban = Ban::new("bob!*b@*.example", "oper", 0);
        assert!(ban.hits("bob", "bb", "h.example"));
        assert!(!ban.hits("alice", "bb", "h.example"));
        assert!(!ban.hits("bob", "cc", "h.example"));
    }

    #[test]
    fn coverage_is_one_directional() {
        let bans = vec![Ban::new("*!*@*.example", "oper", 0)];
        // The broad existing ban covers a narrower candidate.
        assert!(covered(&bans, "bob!b@h.example"));
        // A broader candidate is not covered by a narrower entry.
        let narrow = vec![Ban::new("bob!b@h.example", "oper", 0)];
        assert!(!covered(&narrow, "*!*@*.example"));
    }

    #[test]
    fn exact_duplicate_is_covered() {
        let bans = vec![Ban::new("*!*@evil.example", "oper", 0)];
        assert!(covered(&bans, "*!*@evil.example"));
    }
}
