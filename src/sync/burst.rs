//! SJOIN wire rendering and parsing.
//!
//! A channel's state travels between servers in one of three forms:
//!
//! - legacy dual-timestamp: `:srv SJOIN <ts> <ts> <chan> <modes> [args] :<members>`
//! - current single-timestamp: `:srv SJOIN <ts> <chan> <modes> [args] :<members>`
//! - compact client-originated: `:nick SJOIN <ts> <chan>`
//!
//! Member tokens carry `@`/`+` privilege sigils. Rendering chunks the
//! member list so no line ever exceeds the wire maximum; continuation
//! chunks carry `+` in the mode slot (an equal-TS merge of a chunk
//! against the chunk before it is a no-op on modes).

use crate::state::{ChannelModes, MemberModes};
use tsirc_proto::{Message, Prefix, MAX_LINE_LEN};

/// Which burst form a peer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SjoinDialect {
    Legacy,
    Current,
}

/// A parsed incoming SJOIN, normalized across all three forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SjoinIn {
    pub ts: i64,
    pub channel: String,
    pub modes: ChannelModes,
    /// Member tokens with sigils still attached.
    pub members: Vec<String>,
}

/// Render a channel's state as one or more SJOIN lines.
pub fn render_sjoin(
    dialect: SjoinDialect,
    origin: &str,
    ts: i64,
    channel: &str,
    modes: &ChannelModes,
    members: &[(MemberModes, String)],
) -> Vec<Message> {
    let (mode_str, mode_args) = modes.to_wire();
    let tokens: Vec<String> = members
        .iter()
        .map(|(modes, name)| format!("{}{}", modes.sigils(), name))
        .collect();

    let mut lines = Vec::new();
    let mut chunk: Vec<&str> = Vec::new();
    let mut first_chunk = true;
    let mut used = base_len(dialect, origin, ts, channel, &mode_str, &mode_args);

    let budget = MAX_LINE_LEN - 2;
    let mut idx = 0;
    while idx < tokens.len() {
        let token = tokens[idx].as_str();
        let cost = token.len() + usize::from(!chunk.is_empty());
        if used + cost > budget && !chunk.is_empty() {
            lines.push(assemble(
                dialect, origin, ts, channel, &mode_str, &mode_args, &chunk, first_chunk,
            ));
            first_chunk = false;
            chunk.clear();
            used = base_len(dialect, origin, ts, channel, "+", &[]);
            continue;
        }
        chunk.push(token);
        used += cost;
        idx += 1;
    }
    lines.push(assemble(
        dialect, origin, ts, channel, &mode_str, &mode_args, &chunk, first_chunk,
    ));
    lines
}

/// Render the compact client-originated form.
pub fn render_client_sjoin(origin: Prefix, ts: i64, channel: &str) -> Message {
    Message::with_prefix(origin, "SJOIN", vec![ts.to_string(), channel.to_string()])
}

fn base_len(
    dialect: SjoinDialect,
    origin: &str,
    ts: i64,
    channel: &str,
    mode_str: &str,
    mode_args: &[String],
) -> usize {
    assemble(dialect, origin, ts, channel, mode_str, mode_args, &[], true)
        .to_string()
        .len()
}

fn assemble(
    dialect: SjoinDialect,
    origin: &str,
    ts: i64,
    channel: &str,
    mode_str: &str,
    mode_args: &[String],
    members: &[&str],
    first_chunk: bool,
) -> Message {
    let mut params = Vec::new();
    params.push(ts.to_string());
    if dialect == SjoinDialect::Legacy {
        params.push(ts.to_string());
    }
    params.push(channel.to_string());
    if first_chunk {
        params.push(mode_str.to_string());
        params.extend(mode_args.iter().cloned());
    } else {
        params.push("+".to_string());
    }
    params.push(members.join(" "));
    let mut msg = Message::with_prefix(Prefix::Server(origin.to_string()), "SJOIN", params);
    // The member list is trailing even when it holds a single token.
    msg.force_trailing = true;
    msg
}

/// Parse any of the three SJOIN forms. Returns `None` for lines too
/// malformed to act on (the caller logs and drops them).
pub fn parse_sjoin(msg: &Message) -> Option<SjoinIn> {
    let ts: i64 = msg.arg(0)?.parse().ok()?;

    // Compact client-originated form: SJOIN <ts> <chan>
    if msg.params.len() == 2 {
        let nick = match &msg.prefix {
            Some(Prefix::User { nick, .. }) => nick.clone(),
            _ => return None,
        };
        return Some(SjoinIn {
            ts,
            channel: msg.arg(1)?.to_string(),
            modes: ChannelModes::default(),
            members: vec![nick],
        });
    }

    // Legacy form carries a second timestamp before the channel.
    let legacy = msg.arg(1).is_some_and(|a| a.parse::<i64>().is_ok())
        && msg.arg(2).is_some_and(tsirc_proto::is_channel_name);
    let chan_idx = if legacy { 2 } else { 1 };

    let channel = msg.arg(chan_idx)?.to_string();
    if !tsirc_proto::is_channel_name(&channel) {
        return None;
    }
    let mode_str = msg.arg(chan_idx + 1)?.to_string();
    let last = msg.params.len() - 1;
    let mode_args = &msg.params[chan_idx + 2..last];
    let members = msg.params[last]
        .split_whitespace()
        .map(str::to_string)
        .collect();

    Some(SjoinIn {
        ts,
        channel,
        modes: ChannelModes::from_wire(&mode_str, mode_args),
        members,
    })
}
