//! Wire-protocol primitives for tsircd.
//!
//! This crate deliberately stays small: it knows how to frame, parse and
//! render IRC lines and how to compare the strings that appear in them.
//! Everything stateful (channels, members, timestamps, fanout) lives in
//! the daemon.
//!
//! Modules:
//! - [`line`]: newline-framed codec with the 512-byte protocol cap.
//! - [`message`]: `[:prefix] COMMAND args [:trailing]` parse/serialize.
//! - [`casemap`]: RFC 1459 case-insensitive comparison.
//! - [`mask`]: `*`/`?` wildcard matching under IRC casemapping.
//! - [`mode`]: the channel mode-letter table (arity per direction).

pub mod casemap;
pub mod line;
pub mod mask;
pub mod message;
pub mod mode;

pub use casemap::{irc_eq, irc_to_lower};
pub use line::LineCodec;
pub use mask::match_mask;
pub use message::{Message, ParseError, Prefix};
pub use mode::ChannelModeChar;

/// Maximum length of a single wire line, including the trailing CRLF.
///
/// Burst lines that would exceed this are chunked by the sender, never
/// truncated mid-token.
pub const MAX_LINE_LEN: usize = 512;

/// Returns true if `name` is syntactically a channel name.
pub fn is_channel_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('#' | '&'))
        && name.len() <= 64
        && !name.contains([' ', ',', '\x07'])
}
