//! The mode delta engine.
//!
//! A mode request is a stream of `+`/`-` signed letters with trailing
//! arguments. Each token is validated against the requester's privilege
//! tier and current channel state, applied, and appended to a bounded
//! [`ModeWriter`]; the resulting canonical delta is what gets fanned
//! out, so observers only ever see changes that actually took effect.
//!
//! Error conditions are latched once per request: a requester who sends
//! twenty tokens without privileges gets one 482, not twenty.

use super::events::ModeOrigin;
use super::ChannelActor;
use crate::network::fanout::{EventSource, Outbound};
use crate::state::{Ban, covered, Matrix, ModeOutcome, ModeWriter, Privilege};
use std::sync::Arc;
use tracing::debug;
use tsirc_proto::{irc_eq, ChannelModeChar};

impl ChannelActor {
    pub(super) fn handle_mode(
        &mut self,
        matrix: &Arc<Matrix>,
        origin: &ModeOrigin,
        tokens: &str,
        args: &[String],
    ) -> ModeOutcome {
        let outcome = self.apply_mode(matrix, origin, tokens, args);
        if !outcome.is_empty() {
            let mut params = vec![self.name.clone(), outcome.tokens.clone()];
            params.extend(outcome.params.iter().cloned());
            let (source, except) = match origin {
                ModeOrigin::Member {
                    nick, user, host, ..
                } => (
                    EventSource::User {
                        nick: nick.clone(),
                        user: user.clone(),
                        host: host.clone(),
                    },
                    None,
                ),
                ModeOrigin::Server { name, via } => {
                    (EventSource::Server(name.clone()), Some(*via))
                }
            };
            let mut out = Outbound::new(matrix, source, "MODE", params);
            out.send_to(matrix, self.member_links().iter());
            out.send_to_servers(matrix, except);
        }
        outcome
    }

    /// Run the request against channel state. Mutations and the output
    /// delta stay in lockstep: a token the writer cannot fit is dropped
    /// whole, before any state change.
    fn apply_mode(
        &mut self,
        matrix: &Arc<Matrix>,
        origin: &ModeOrigin,
        tokens: &str,
        args: &[String],
    ) -> ModeOutcome {
        let privilege = self.privilege_of(origin);
        let prefix = origin.prefix();
        let mut writer = ModeWriter::new(ModeWriter::line_budget(&prefix, &self.name));
        let mut outcome = ModeOutcome::default();
        let max_modes = matrix.config.limits.max_modes;
        let max_bans = matrix.config.limits.max_bans;

        let mut plus = true;
        let mut args = args.iter();
        for c in tokens.chars() {
            match c {
                '+' => plus = true,
                '-' => plus = false,
                letter => {
                    // Servers burst reconciliation deltas of any length;
                    // client requests stop at the ceiling.
                    if !privilege.is_server() && writer.token_count() >= max_modes {
                        break;
                    }
                    let Some(mode) = ChannelModeChar::from_char(letter) else {
                        if !privilege.is_server() {
                            outcome.note_unknown(letter);
                        }
                        continue;
                    };
                    if !privilege.may_set() {
                        outcome.privs_rejected = true;
                        continue;
                    }
                    let param = if mode.takes_arg(plus) {
                        match args.next() {
                            Some(p) => Some(p.as_str()),
                            None => {
                                outcome.missing_param = true;
                                continue;
                            }
                        }
                    } else {
                        None
                    };
                    self.apply_one(&prefix, privilege, max_bans, &mut writer, plus, mode, param);
                }
            }
        }

        let (tokens, params) = writer.finish();
        outcome.tokens = tokens;
        outcome.params = params;
        debug!(
            channel = %self.name,
            delta = %outcome.tokens,
            privs_rejected = outcome.privs_rejected,
            missing_param = outcome.missing_param,
            "mode request applied"
        );
        outcome
    }

    fn privilege_of(&self, origin: &ModeOrigin) -> Privilege {
        match origin {
            ModeOrigin::Server { .. } => Privilege::Server,
            ModeOrigin::Member { uid, .. } => match self.members.get(uid) {
                Some(m) if m.modes.op => Privilege::ChanOp,
                _ => Privilege::None,
            },
        }
    }

    fn apply_one(
        &mut self,
        set_by: &str,
        privilege: Privilege,
        max_bans: usize,
        writer: &mut ModeWriter,
        plus: bool,
        mode: ChannelModeChar,
        param: Option<&str>,
    ) {
        let letter = mode.to_char();
        match mode {
            ChannelModeChar::Op | ChannelModeChar::Voice => {
                let Some(nick) = param else { return };
                let Some(uid) = self.member_by_nick(nick).cloned() else {
                    return;
                };
                let Some(member) = self.members.get_mut(&uid) else {
                    return;
                };
                let current = if mode == ChannelModeChar::Op {
                    member.modes.op
                } else {
                    member.modes.voice
                };
                if current == plus {
                    return;
                }
                // Emit the canonical nick, not the requester's spelling.
                let canonical = member.nick.clone();
                if !writer.push(plus, letter, Some(&canonical)) {
                    return;
                }
                if mode == ChannelModeChar::Op {
                    member.modes.op = plus;
                    if plus {
                        member.modes.deopped = false;
                    }
                } else {
                    member.modes.voice = plus;
                }
            }
            ChannelModeChar::Ban => {
                let Some(mask) = param else { return };
                if plus {
                    // The cap binds local requesters only; a relayed ban
                    // already passed it on its origin server.
                    if !privilege.is_server() && self.bans.len() >= max_bans {
                        return;
                    }
                    if covered(&self.bans, mask) {
                        return;
                    }
                    if !writer.push(true, 'b', Some(mask)) {
                        return;
                    }
                    self.bans
                        .push(Ban::new(mask, set_by, chrono::Utc::now().timestamp()));
                    self.recompute_ban_hits();
                } else {
                    let Some(idx) = self.bans.iter().position(|b| irc_eq(&b.mask, mask)) else {
                        return;
                    };
                    // Echo the stored spelling of the mask.
                    let stored = self.bans[idx].mask.clone();
                    if !writer.push(false, 'b', Some(&stored)) {
                        return;
                    }
                    self.bans.remove(idx);
                    self.recompute_ban_hits();
                }
            }
            ChannelModeChar::Key => {
                if plus {
                    let Some(key) = param else { return };
                    if self.modes.key.as_deref() == Some(key) {
                        return;
                    }
                    if writer.push(true, 'k', Some(key)) {
                        self.modes.key = Some(key.to_string());
                    }
                } else {
                    if self.modes.key.is_none() {
                        return;
                    }
                    if writer.push(false, 'k', None) {
                        self.modes.key = None;
                    }
                }
            }
            ChannelModeChar::Limit => {
                if plus {
                    // A malformed limit is silently skipped.
                    let Some(limit) = param.and_then(|p| p.parse::<u32>().ok()) else {
                        return;
                    };
                    if limit == 0 || self.modes.limit == Some(limit) {
                        return;
                    }
                    let canonical = limit.to_string();
                    if writer.push(true, 'l', Some(&canonical)) {
                        self.modes.limit = Some(limit);
                    }
                } else {
                    if self.modes.limit.is_none() {
                        return;
                    }
                    if writer.push(false, 'l', None) {
                        self.modes.limit = None;
                    }
                }
            }
            flag => {
                let letter = flag.to_char();
                if self.modes.flags.get(letter) == Some(plus) {
                    return;
                }
                if writer.push(plus, letter, None) {
                    self.modes.flags.set(letter, plus);
                }
            }
        }
    }
}
