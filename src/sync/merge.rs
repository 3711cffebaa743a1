//! Timestamp-based channel state reconciliation.
//!
//! After a netsplit heals, both sides of a link hold divergent views of
//! the same channel. This module decides, deterministically, whose
//! modes and privileges survive. It is pure: the channel actor applies
//! the returned [`MergeOutcome`] to its owned state and emits the
//! corrective traffic.
//!
//! The rules, in order:
//! 1. No local channel: adopt the remote view wholesale.
//! 2. Either TS is zero: the channel is pinned to TS 0 forever and the
//!    views are merged as if equal.
//! 3. Remote TS older: the remote is authoritative. If it asserts ops
//!    (or the local side has none to defend), local privileges and bans
//!    are distrusted and swept; otherwise local modes survive at the
//!    winning (minimum) TS.
//! 4. Local TS older: symmetric, except that ops asserted against an
//!    opless local channel is an impossible combination — logged as a
//!    desync and the remote view is adopted best-effort.
//! 5. Equal TS: union of mode bits, max of non-zero limits, and the
//!    lexicographically greater key — a deterministic, commutative
//!    tie-break that both sides compute identically.

use crate::state::ChannelModes;

/// The local side of a merge.
#[derive(Debug, Clone)]
pub struct LocalView {
    pub ts: i64,
    pub modes: ChannelModes,
    /// Whether any current member holds (non-deopped) chanop.
    pub has_ops: bool,
}

/// The incoming peer's view of the channel.
#[derive(Debug, Clone)]
pub struct RemoteView {
    pub ts: i64,
    pub modes: ChannelModes,
    /// Whether the incoming member list carries an `@` sigil.
    pub asserts_ops: bool,
}

/// What happens to channel mode state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeVerdict {
    /// Discard local mode bits/key/limit in favor of the remote's.
    AdoptRemote,
    /// Ignore the remote's mode claims entirely.
    KeepLocal,
    /// Equal-TS (or TS-0) bitwise union.
    Union,
}

/// The reconciled result the actor applies.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The channel's TS after the merge.
    pub ts: i64,
    pub verdict: ModeVerdict,
    /// Strip every local chanop/voice (emitting `-o`/`-v`) and clear
    /// the ban list before applying the rest of the outcome.
    pub strip_local: bool,
    /// Whether `@`/`+` sigils in the incoming member list are granted;
    /// when false they are stripped and members join unprivileged.
    pub honor_remote_sigils: bool,
    /// The resolved channel modes.
    pub modes: ChannelModes,
    /// A detected impossible TS/ops combination, reported to operators.
    pub desync: Option<String>,
}

/// Reconcile a remote view against local state.
pub fn merge(local: Option<&LocalView>, remote: &RemoteView) -> MergeOutcome {
    let Some(local) = local else {
        return MergeOutcome {
            ts: remote.ts,
            verdict: ModeVerdict::AdoptRemote,
            strip_local: false,
            honor_remote_sigils: true,
            modes: remote.modes.clone(),
            desync: None,
        };
    };

    if local.ts == 0 || remote.ts == 0 {
        // TS 0 is sticky: the channel can never regain TS authority.
        let desync = remote
            .asserts_ops
            .then(|| "ops asserted during TS-0 channel merge".to_string());
        return MergeOutcome {
            ts: 0,
            verdict: ModeVerdict::Union,
            strip_local: false,
            honor_remote_sigils: true,
            modes: union_modes(&local.modes, &remote.modes),
            desync,
        };
    }

    if remote.ts < local.ts {
        if remote.asserts_ops || !local.has_ops {
            // The older side asserts ownership: everything local is
            // distrusted. With no local ops the result is identical,
            // there is just nothing to strip.
            MergeOutcome {
                ts: remote.ts,
                verdict: ModeVerdict::AdoptRemote,
                strip_local: true,
                honor_remote_sigils: true,
                modes: remote.modes.clone(),
                desync: None,
            }
        } else {
            // Remote is older but claims nothing; local modes stand,
            // the channel TS still drops to the winning minimum.
            MergeOutcome {
                ts: remote.ts,
                verdict: ModeVerdict::KeepLocal,
                strip_local: false,
                honor_remote_sigils: false,
                modes: local.modes.clone(),
                desync: None,
            }
        }
    } else if local.ts < remote.ts {
        if local.has_ops {
            MergeOutcome {
                ts: local.ts,
                verdict: ModeVerdict::KeepLocal,
                strip_local: false,
                honor_remote_sigils: false,
                modes: local.modes.clone(),
                desync: None,
            }
        } else if remote.asserts_ops {
            // Newer side hands out ops on a channel nobody defends.
            // Impossible under TS rules; adopt best-effort and tell
            // the operators.
            MergeOutcome {
                ts: remote.ts,
                verdict: ModeVerdict::AdoptRemote,
                strip_local: true,
                honor_remote_sigils: true,
                modes: remote.modes.clone(),
                desync: Some(format!(
                    "hacked ops on opless channel (local ts {} < remote ts {})",
                    local.ts, remote.ts
                )),
            }
        } else {
            MergeOutcome {
                ts: local.ts,
                verdict: ModeVerdict::KeepLocal,
                strip_local: false,
                honor_remote_sigils: false,
                modes: local.modes.clone(),
                desync: None,
            }
        }
    } else {
        MergeOutcome {
            ts: local.ts,
            verdict: ModeVerdict::Union,
            strip_local: false,
            honor_remote_sigils: true,
            modes: union_modes(&local.modes, &remote.modes),
            desync: None,
        }
    }
}

/// Equal-TS mode resolution: never drops a bit set on either side.
fn union_modes(a: &ChannelModes, b: &ChannelModes) -> ChannelModes {
    let key = match (&a.key, &b.key) {
        (Some(x), Some(y)) => Some(std::cmp::max(x, y).clone()),
        (Some(x), None) => Some(x.clone()),
        (None, Some(y)) => Some(y.clone()),
        (None, None) => None,
    };
    let limit = match (a.limit, b.limit) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    };
    ChannelModes {
        flags: a.flags.union(b.flags),
        key,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(letters: &str) -> ChannelModes {
        ChannelModes::from_wire(letters, &[])
    }

    fn local(ts: i64, has_ops: bool) -> LocalView {
        LocalView {
            ts,
            modes: modes("+nt"),
            has_ops,
        }
    }

    fn remote(ts: i64, asserts_ops: bool) -> RemoteView {
        RemoteView {
            ts,
            modes: modes("+m"),
            asserts_ops,
        }
    }

    #[test]
    fn no_local_channel_adopts_remote() {
        let out = merge(None, &remote(100, true));
        assert_eq!(out.ts, 100);
        assert_eq!(out.verdict, ModeVerdict::AdoptRemote);
        assert!(out.honor_remote_sigils);
        assert!(!out.strip_local);
    }

    #[test]
    fn older_remote_with_ops_distrusts_local() {
        let out = merge(Some(&local(100, true)), &remote(50, true));
        assert_eq!(out.ts, 50);
        assert_eq!(out.verdict, ModeVerdict::AdoptRemote);
        assert!(out.strip_local);
        assert!(out.honor_remote_sigils);
    }

    #[test]
    fn older_remote_without_ops_keeps_local_modes_at_winning_ts() {
        let out = merge(Some(&local(100, true)), &remote(50, false));
        assert_eq!(out.ts, 50);
        assert_eq!(out.verdict, ModeVerdict::KeepLocal);
        assert!(!out.strip_local);
        assert!(!out.honor_remote_sigils);
        assert_eq!(out.modes, modes("+nt"));
    }

    #[test]
    fn newer_remote_is_ignored_when_local_defends() {
        let out = merge(Some(&local(100, true)), &remote(500, true));
        assert_eq!(out.ts, 100);
        assert_eq!(out.verdict, ModeVerdict::KeepLocal);
        assert!(!out.honor_remote_sigils);
    }

    #[test]
    fn hacked_ops_on_opless_channel_is_flagged_and_adopted() {
        let out = merge(Some(&local(100, false)), &remote(500, true));
        assert_eq!(out.ts, 500);
        assert_eq!(out.verdict, ModeVerdict::AdoptRemote);
        assert!(out.desync.is_some());
        assert!(out.honor_remote_sigils);
    }

    #[test]
    fn newer_remote_without_ops_changes_nothing() {
        let out = merge(Some(&local(100, false)), &remote(500, false));
        assert_eq!(out.ts, 100);
        assert_eq!(out.verdict, ModeVerdict::KeepLocal);
        assert!(out.desync.is_none());
    }

    #[test]
    fn ts_selection_is_minimum_for_defended_channels() {
        for (a, b) in [(50i64, 100i64), (100, 50), (1, 2), (7, 7)] {
            let out = merge(
                Some(&local(a, true)),
                &RemoteView {
                    ts: b,
                    modes: modes("+m"),
                    asserts_ops: true,
                },
            );
            assert_eq!(out.ts, a.min(b), "ts {} vs {}", a, b);
        }
    }

    #[test]
    fn zero_ts_is_sticky() {
        let out = merge(Some(&local(0, true)), &remote(500, false));
        assert_eq!(out.ts, 0);
        let out = merge(Some(&local(500, true)), &remote(0, false));
        assert_eq!(out.ts, 0);
        // And a later non-zero merge cannot lift it.
        let pinned = LocalView {
            ts: 0,
            modes: modes("+nt"),
            has_ops: true,
        };
        let out = merge(Some(&pinned), &remote(1, true));
        assert_eq!(out.ts, 0);
    }

    #[test]
    fn zero_ts_with_remote_ops_warns() {
        let out = merge(
            Some(&local(100, true)),
            &RemoteView {
                ts: 0,
                modes: modes("+m"),
                asserts_ops: true,
            },
        );
        assert_eq!(out.ts, 0);
        assert!(out.desync.is_some());
    }

    #[test]
    fn equal_ts_unions_mode_bits() {
        let a = LocalView {
            ts: 100,
            modes: modes("+nt"),
            has_ops: true,
        };
        let b = RemoteView {
            ts: 100,
            modes: modes("+ms"),
            asserts_ops: true,
        };
        let out = merge(Some(&a), &b);
        assert_eq!(out.verdict, ModeVerdict::Union);
        assert_eq!(out.modes, modes("+mnst"));
    }

    #[test]
    fn equal_ts_takes_max_limit_and_greater_key() {
        let mut am = modes("+n");
        am.key = Some("apple".into());
        am.limit = Some(10);
        let mut bm = modes("+n");
        bm.key = Some("banana".into());
        bm.limit = Some(25);

        let a = LocalView { ts: 9, modes: am.clone(), has_ops: true };
        let b = RemoteView { ts: 9, modes: bm.clone(), asserts_ops: false };
        let forward = merge(Some(&a), &b);
        assert_eq!(forward.modes.key.as_deref(), Some("banana"));
        assert_eq!(forward.modes.limit, Some(25));

        // Commutative: swapping sides picks the same key.
        let a2 = LocalView { ts: 9, modes: bm, has_ops: true };
        let b2 = RemoteView { ts: 9, modes: am, asserts_ops: false };
        let reverse = merge(Some(&a2), &b2);
        assert_eq!(reverse.modes.key, forward.modes.key);
        assert_eq!(reverse.modes.limit, forward.modes.limit);
    }

    #[test]
    fn merging_with_identical_copy_is_identity() {
        let view = LocalView {
            ts: 100,
            modes: modes("+nt"),
            has_ops: true,
        };
        let twin = RemoteView {
            ts: 100,
            modes: modes("+nt"),
            asserts_ops: true,
        };
        let out = merge(Some(&view), &twin);
        assert_eq!(out.ts, 100);
        assert_eq!(out.modes, view.modes);
        assert!(!out.strip_local);
        assert!(out.desync.is_none());
    }
}
