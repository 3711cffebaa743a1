//! Applying a reconciled SJOIN to owned channel state.
//!
//! The pure merge decision lives in `sync::merge`; this file carries it
//! out: sweeping distrusted privileges and bans, correcting channel
//! modes, admitting the incoming members, and relaying the reconciled
//! result onward so the rest of the network converges on the same view.

use super::ChannelActor;
use crate::network::fanout::{self, EventSource, Outbound};
use crate::state::{ChannelModes, Matrix, Member, MemberModes, ModeWriter, UserAttach};
use crate::sync::burst::SjoinIn;
use crate::sync::merge::{merge, LocalView, RemoteView};
use crate::state::LinkId;
use crate::state::split_sigils;
use std::sync::Arc;
use tracing::{info, warn};

/// Accumulates corrective mode tokens, breaking into a fresh line
/// whenever the writer's byte budget runs out. Merge sweeps can strip
/// hundreds of privileges; none may be silently lost to line length.
struct ChunkedWriter {
    budget: usize,
    lines: Vec<(String, Vec<String>)>,
    writer: ModeWriter,
}

impl ChunkedWriter {
    fn new(origin: &str, channel: &str) -> ChunkedWriter {
        let budget = ModeWriter::line_budget(origin, channel);
        ChunkedWriter {
            budget,
            lines: Vec::new(),
            writer: ModeWriter::new(budget),
        }
    }

    fn push(&mut self, plus: bool, letter: char, param: Option<&str>) {
        if !self.writer.push(plus, letter, param) {
            self.flush();
            // A single token always fits a fresh line.
            self.writer.push(plus, letter, param);
        }
    }

    fn flush(&mut self) {
        if !self.writer.is_empty() {
            let full = std::mem::replace(&mut self.writer, ModeWriter::new(self.budget));
            self.lines.push(full.finish());
        }
    }

    fn finish(mut self) -> Vec<(String, Vec<String>)> {
        self.flush();
        self.lines
    }
}

/// Corrective delta between two mode states, pushed as signed tokens.
fn mode_diff(old: &ChannelModes, new: &ChannelModes, cw: &mut ChunkedWriter) {
    for letter in ['i', 'm', 'n', 'p', 's', 't'] {
        let was = old.flags.get(letter);
        let is = new.flags.get(letter);
        if was != is {
            cw.push(is == Some(true), letter, None);
        }
    }
    if old.key != new.key {
        if old.key.is_some() {
            cw.push(false, 'k', None);
        }
        if let Some(key) = &new.key {
            cw.push(true, 'k', Some(key));
        }
    }
    if old.limit != new.limit {
        match new.limit {
            Some(limit) => cw.push(true, 'l', Some(&limit.to_string())),
            None => cw.push(false, 'l', None),
        }
    }
}

impl ChannelActor {
    pub(super) fn handle_sjoin(&mut self, matrix: &Arc<Matrix>, via: LinkId, incoming: SjoinIn) {
        let parsed: Vec<(MemberModes, String)> = incoming
            .members
            .iter()
            .map(|token| {
                let (modes, nick) = split_sigils(token);
                (modes, nick.to_string())
            })
            .collect();
        let asserts_ops = parsed.iter().any(|(m, _)| m.op);

        let local = self.populated.then(|| LocalView {
            ts: self.ts,
            modes: self.modes.clone(),
            has_ops: self.has_ops(),
        });
        let remote = RemoteView {
            ts: incoming.ts,
            modes: incoming.modes.clone(),
            asserts_ops,
        };
        let outcome = merge(local.as_ref(), &remote);

        if let Some(reason) = &outcome.desync {
            warn!(channel = %self.name, %reason, "channel desync detected");
            fanout::notice_opers(
                matrix,
                &format!("*** Desync on {}: {}", self.name, reason),
            );
        }

        info!(
            channel = %self.name,
            local_ts = local.as_ref().map(|l| l.ts),
            remote_ts = incoming.ts,
            result_ts = outcome.ts,
            verdict = ?outcome.verdict,
            strip = outcome.strip_local,
            "sjoin merge"
        );

        let server_name = matrix.server_info.name.clone();
        let mut cw = ChunkedWriter::new(&server_name, &self.name);

        if outcome.strip_local {
            // Everything local is distrusted: sweep privileges so the
            // channel's op set is exactly what the winner asserts.
            for member in self.members.values_mut() {
                if member.modes.op {
                    cw.push(false, 'o', Some(&member.nick));
                    member.modes.op = false;
                    member.modes.deopped = true;
                }
                if member.modes.voice {
                    cw.push(false, 'v', Some(&member.nick));
                    member.modes.voice = false;
                }
            }
            for ban in std::mem::take(&mut self.bans) {
                cw.push(false, 'b', Some(&ban.mask));
            }
            self.recompute_ban_hits();
        }

        let old_modes = self.modes.clone();
        self.ts = outcome.ts;
        self.modes = outcome.modes.clone();
        mode_diff(&old_modes, &self.modes, &mut cw);

        // Admit the incoming members.
        let mut relayed: Vec<(MemberModes, String)> = Vec::new();
        for (mut sigils, nick) in parsed {
            if !outcome.honor_remote_sigils {
                sigils = MemberModes::default();
            }
            let Some(uid) = matrix.find_uid_by_nick(&nick) else {
                warn!(channel = %self.name, %nick, "sjoin names unknown nick, skipped");
                continue;
            };
            if let Some(existing) = self.members.get_mut(&uid) {
                // Already here from our side of the split; grant any
                // newly-asserted privilege.
                if sigils.op && !existing.modes.op {
                    existing.modes.op = true;
                    existing.modes.deopped = false;
                    cw.push(true, 'o', Some(&existing.nick));
                }
                if sigils.voice && !existing.modes.voice {
                    existing.modes.voice = true;
                    cw.push(true, 'v', Some(&existing.nick));
                }
                relayed.push((existing.modes, nick));
                continue;
            }

            let Some(user) = matrix.users.get(&uid).map(|u| u.clone()) else {
                continue;
            };
            let link = match user.attach {
                UserAttach::Local(id) => matrix.links.get(&id).map(|l| l.value().clone()),
                UserAttach::Remote { .. } => None,
            };
            let member = Member {
                uid: uid.clone(),
                nick: user.nick.clone(),
                user: user.user.clone(),
                host: user.host.clone(),
                ip: user.ip.clone(),
                modes: sigils,
                ban_hits: self.ban_hits_for(&user.nick, &user.user, &user.host, &user.ip),
                link,
            };

            let mut join = Outbound::new(
                matrix,
                EventSource::User {
                    nick: member.nick.clone(),
                    user: member.user.clone(),
                    host: member.host.clone(),
                },
                "JOIN",
                vec![self.name.clone()],
            );
            join.send_to(matrix, self.member_links().iter());

            if sigils.op {
                cw.push(true, 'o', Some(&member.nick));
            }
            if sigils.voice {
                cw.push(true, 'v', Some(&member.nick));
            }

            if let Some(mut entry) = matrix.users.get_mut(&uid) {
                entry.channels.insert(self.folded.clone());
            }
            self.members.insert(uid, member);
            relayed.push((sigils, nick));
        }
        if !self.members.is_empty() {
            self.populated = true;
        }

        // Local clients see the reconciliation as server-origin MODEs.
        let corrections = cw.finish();
        if !corrections.is_empty() {
            let links = self.member_links();
            for (tokens, params) in corrections {
                let mut line_params = vec![self.name.clone(), tokens];
                line_params.extend(params);
                let mut out = Outbound::new(
                    matrix,
                    EventSource::Server(server_name.clone()),
                    "MODE",
                    line_params,
                );
                out.send_to(matrix, links.iter());
            }
        }

        // Relay the reconciled view onward, never the raw incoming one.
        if !relayed.is_empty() {
            self.relay_sjoin(matrix, Some(via), &relayed);
        }
    }
}
