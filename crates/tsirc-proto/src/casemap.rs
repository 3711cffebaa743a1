//! IRC case-mapping.
//!
//! IRC names compare case-insensitively under the `rfc1459` mapping,
//! where `[]\~` are the uppercase forms of `{}|^`. Every registry key in
//! the daemon (nicks, channel names) is stored pre-folded with
//! [`irc_to_lower`].

/// Fold a single character to IRC lowercase (RFC 1459 mapping).
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a string to IRC lowercase.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive equality under the RFC 1459 mapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.chars()
            .zip(b.chars())
            .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

/// Ordering over IRC-folded strings.
///
/// Used for the deterministic key tie-break during equal-TS channel
/// merges: both sides must agree which of two keys is "greater"
/// regardless of the case the key arrived in.
pub fn irc_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    a.chars()
        .map(irc_lower_char)
        .cmp(b.chars().map(irc_lower_char))
}
