//! Membership churn and in-channel traffic: JOIN, PART, QUIT, KICK,
//! TOPIC, PRIVMSG/NOTICE and INVITE.

use super::events::{InviteDenied, JoinDenied, JoinOk, KickDenied, TopicResult};
use super::ChannelActor;
use crate::network::fanout::{self, EventSource, FanoutCall, Outbound};
use crate::state::{Matrix, Member, Topic, Uid, UserAttach};
use crate::sync::burst::render_client_sjoin;
use std::sync::Arc;
use tracing::info;
use tsirc_proto::Prefix;

impl ChannelActor {
    pub(super) fn handle_join(
        &mut self,
        matrix: &Arc<Matrix>,
        mut member: Member,
        key: Option<String>,
    ) -> Result<JoinOk, JoinDenied> {
        if self.members.contains_key(&member.uid) {
            return Ok(JoinOk {
                channel: self.name.clone(),
                topic: self.topic.clone(),
                names: self.names(),
                already: true,
            });
        }

        // An invitation overrides every admission check, including bans.
        let invited = self.invites.contains(&member.uid);
        let hits = self.ban_hits_for(&member.nick, &member.user, &member.host, &member.ip);
        if !invited {
            if hits > 0 {
                return Err(JoinDenied::Banned);
            }
            if self.modes.flags.invite_only {
                return Err(JoinDenied::InviteOnly);
            }
            if let Some(wanted) = &self.modes.key {
                if key.as_deref() != Some(wanted.as_str()) {
                    return Err(JoinDenied::BadKey);
                }
            }
            if let Some(limit) = self.modes.limit {
                if self.members.len() >= limit as usize {
                    return Err(JoinDenied::Full);
                }
            }
        }
        self.invites.remove(&member.uid);

        let creating = !self.populated;
        member.modes.op = creating;
        member.ban_hits = hits;

        if let Some(mut user) = matrix.users.get_mut(&member.uid) {
            user.channels.insert(self.folded.clone());
        }

        let mut out = Outbound::new(
            matrix,
            self.source_for(&member),
            "JOIN",
            vec![self.name.clone()],
        );
        if let Some(link) = &member.link {
            out.send(matrix, link);
        }
        out.send_to(matrix, self.member_links().iter());

        info!(channel = %self.name, nick = %member.nick, creating, "join");

        if creating {
            // Channel creation propagates as a full SJOIN so the
            // creator's op survives the trip.
            let sigiled = vec![(member.modes, member.nick.clone())];
            self.members.insert(member.uid.clone(), member);
            self.populated = true;
            self.relay_sjoin(matrix, None, &sigiled);
        } else {
            let compact = render_client_sjoin(
                Prefix::User {
                    nick: member.nick.clone(),
                    user: member.user.clone(),
                    host: member.host.clone(),
                },
                self.ts,
                &self.name,
            );
            self.members.insert(member.uid.clone(), member);
            let call = FanoutCall::begin(matrix);
            let line = fanout::line_bytes(&compact);
            for link in matrix.server_links(None) {
                call.deliver_lines(matrix, &link, std::slice::from_ref(&line));
            }
        }

        Ok(JoinOk {
            channel: self.name.clone(),
            topic: self.topic.clone(),
            names: self.names(),
            already: false,
        })
    }

    pub(super) fn handle_part(
        &mut self,
        matrix: &Arc<Matrix>,
        uid: &Uid,
        message: Option<String>,
    ) -> bool {
        let Some(member) = self.members.remove(uid) else {
            return false;
        };
        if let Some(mut user) = matrix.users.get_mut(uid) {
            user.channels.remove(&self.folded);
        }
        self.invites.remove(uid);

        let mut params = vec![self.name.clone()];
        if let Some(message) = message {
            params.push(message);
        }
        let mut out = Outbound::new(matrix, self.source_for(&member), "PART", params);
        if let Some(link) = &member.link {
            out.send(matrix, link);
        }
        out.send_to(matrix, self.member_links().iter());
        out.send_to_servers(matrix, self.relay_exclusion(matrix, uid));
        true
    }

    /// The reaper already told peer servers; this only notifies local
    /// members, under the reaper's shared serial so a user sharing
    /// several channels with the quitter hears it once.
    pub(super) fn handle_quit(
        &mut self,
        matrix: &Arc<Matrix>,
        uid: &Uid,
        message: &str,
        serial: u64,
    ) {
        let Some(member) = self.members.remove(uid) else {
            return;
        };
        self.invites.remove(uid);
        let mut out = Outbound::for_serial(
            serial,
            self.source_for(&member),
            "QUIT",
            vec![message.to_string()],
        );
        out.send_to(matrix, self.member_links().iter());
    }

    /// Rename a member in place. The NICK line is announced to local
    /// members under the caller's serial; the caller handles relays.
    pub(super) fn handle_nick_change(
        &mut self,
        matrix: &Arc<Matrix>,
        uid: &Uid,
        old_nick: &str,
        new_nick: &str,
        serial: u64,
    ) {
        let Some(member) = self.members.get_mut(uid) else {
            return;
        };
        member.nick = new_nick.to_string();
        let (user, host) = (member.user.clone(), member.host.clone());
        let mut out = Outbound::for_serial(
            serial,
            EventSource::User {
                nick: old_nick.to_string(),
                user,
                host,
            },
            "NICK",
            vec![new_nick.to_string()],
        );
        out.send_to(matrix, self.member_links().iter());
    }

    pub(super) fn handle_kick(
        &mut self,
        matrix: &Arc<Matrix>,
        by: &Uid,
        target: &str,
        reason: &str,
    ) -> Result<(), KickDenied> {
        let Some(kicker) = self.members.get(by) else {
            return Err(KickDenied::NotOnChannel);
        };
        if !kicker.modes.op {
            return Err(KickDenied::NotOp);
        }
        let source = self.source_for(kicker);
        let Some(target_uid) = self.member_by_nick(target).cloned() else {
            return Err(KickDenied::TargetAbsent);
        };

        let Some(victim) = self.members.remove(&target_uid) else {
            return Err(KickDenied::TargetAbsent);
        };
        if let Some(mut user) = matrix.users.get_mut(&target_uid) {
            user.channels.remove(&self.folded);
        }

        let mut out = Outbound::new(
            matrix,
            source,
            "KICK",
            vec![
                self.name.clone(),
                victim.nick.clone(),
                reason.to_string(),
            ],
        );
        if let Some(link) = &victim.link {
            out.send(matrix, link);
        }
        out.send_to(matrix, self.member_links().iter());
        out.send_to_servers(matrix, self.relay_exclusion(matrix, by));
        Ok(())
    }

    pub(super) fn handle_topic(
        &mut self,
        matrix: &Arc<Matrix>,
        uid: &Uid,
        text: Option<String>,
    ) -> TopicResult {
        let Some(member) = self.members.get(uid) else {
            return TopicResult::NotOnChannel;
        };
        let Some(text) = text else {
            return TopicResult::Query(self.topic.clone());
        };
        if self.modes.flags.topic_lock && !member.modes.op {
            return TopicResult::NotOp;
        }
        let source = self.source_for(member);
        self.topic = Some(Topic {
            text: text.clone(),
            set_by: member.hostmask(),
            set_at: chrono::Utc::now().timestamp(),
        });
        let mut out = Outbound::new(matrix, source, "TOPIC", vec![self.name.clone(), text]);
        out.send_to(matrix, self.member_links().iter());
        out.send_to_servers(matrix, self.relay_exclusion(matrix, uid));
        TopicResult::Set
    }

    /// The send gate. Returns false (handler replies 404) when the
    /// speaker is silenced by +m, a matching ban, or +n as a
    /// non-member.
    pub(super) fn handle_privmsg(
        &mut self,
        matrix: &Arc<Matrix>,
        uid: &Uid,
        notice: bool,
        text: &str,
    ) -> bool {
        let command = if notice { "NOTICE" } else { "PRIVMSG" };
        let (source, sender_link) = match self.members.get(uid) {
            Some(member) => {
                if !member.can_send(self.modes.flags.moderated) {
                    return false;
                }
                (self.source_for(member), member.link.clone())
            }
            None => {
                if self.modes.flags.no_external {
                    return false;
                }
                // External sender: look them up in the entity store.
                let Some(user) = matrix.users.get(uid) else {
                    return false;
                };
                if self.ban_hits_for(&user.nick, &user.user, &user.host, &user.ip) > 0 {
                    return false;
                }
                (
                    EventSource::User {
                        nick: user.nick.clone(),
                        user: user.user.clone(),
                        host: user.host.clone(),
                    },
                    None,
                )
            }
        };

        let mut out = Outbound::new(
            matrix,
            source,
            command,
            vec![self.name.clone(), text.to_string()],
        );
        // The speaker never receives their own message back.
        if let Some(link) = &sender_link {
            out.skip(link);
        }
        out.send_to(matrix, self.member_links().iter());
        out.send_to_servers(matrix, self.relay_exclusion(matrix, uid));
        true
    }

    pub(super) fn handle_invite(
        &mut self,
        matrix: &Arc<Matrix>,
        by: &Uid,
        target: &Uid,
    ) -> Result<(), InviteDenied> {
        let Some(inviter) = self.members.get(by) else {
            return Err(InviteDenied::NotOnChannel);
        };
        if self.modes.flags.invite_only && !inviter.modes.op {
            return Err(InviteDenied::NotOp);
        }
        if self.members.contains_key(target) {
            return Err(InviteDenied::AlreadyOnChannel);
        }
        self.invites.insert(target.clone());

        let Some(user) = matrix.users.get(target) else {
            return Ok(());
        };
        let invite = tsirc_proto::Message::with_prefix(
            Prefix::User {
                nick: inviter.nick.clone(),
                user: inviter.user.clone(),
                host: inviter.host.clone(),
            },
            "INVITE",
            vec![user.nick.clone(), self.name.clone()],
        );
        if let UserAttach::Local(id) = user.attach {
            if let Some(link) = matrix.links.get(&id) {
                fanout::send_line(matrix, link.value(), &invite);
            }
        }
        Ok(())
    }

    pub(super) fn handle_burst(&self, matrix: &Arc<Matrix>, to: crate::state::LinkId) {
        let Some(link) = matrix.links.get(&to).map(|l| l.value().clone()) else {
            return;
        };
        let dialect = if link.caps.legacy_sjoin {
            crate::sync::burst::SjoinDialect::Legacy
        } else {
            crate::sync::burst::SjoinDialect::Current
        };
        let members: Vec<_> = self
            .members
            .values()
            .map(|m| (m.modes, m.nick.clone()))
            .collect();
        for msg in crate::sync::burst::render_sjoin(
            dialect,
            &matrix.server_info.name,
            self.ts,
            &self.name,
            &self.modes,
            &members,
        ) {
            fanout::send_line(matrix, &link, &msg);
        }
    }
}
