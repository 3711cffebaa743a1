//! The channel mode-letter table.
//!
//! This module knows only the grammar: which letters exist and which
//! consume a parameter in which direction. Privilege checks, state
//! mutation and output buffering are the daemon's mode delta engine.

/// A recognized channel mode letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelModeChar {
    /// `+i` invite-only.
    InviteOnly,
    /// `+m` moderated.
    Moderated,
    /// `+n` no external messages.
    NoExternal,
    /// `+p` private.
    Private,
    /// `+s` secret.
    Secret,
    /// `+t` topic locked to chanops.
    TopicLock,
    /// `+k <key>` channel key.
    Key,
    /// `+l <limit>` user limit.
    Limit,
    /// `+o <nick>` channel operator.
    Op,
    /// `+v <nick>` voice.
    Voice,
    /// `+b <mask>` ban.
    Ban,
}

impl ChannelModeChar {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'i' => Self::InviteOnly,
            'm' => Self::Moderated,
            'n' => Self::NoExternal,
            'p' => Self::Private,
            's' => Self::Secret,
            't' => Self::TopicLock,
            'k' => Self::Key,
            'l' => Self::Limit,
            'o' => Self::Op,
            'v' => Self::Voice,
            'b' => Self::Ban,
            _ => return None,
        })
    }

    pub fn to_char(self) -> char {
        match self {
            Self::InviteOnly => 'i',
            Self::Moderated => 'm',
            Self::NoExternal => 'n',
            Self::Private => 'p',
            Self::Secret => 's',
            Self::TopicLock => 't',
            Self::Key => 'k',
            Self::Limit => 'l',
            Self::Op => 'o',
            Self::Voice => 'v',
            Self::Ban => 'b',
        }
    }

    /// Does this letter consume a parameter when applied in `plus`
    /// direction? `-k` still consumes the key being removed on some
    /// dialects, but this daemon's grammar takes `-k` bare.
    pub fn takes_arg(self, plus: bool) -> bool {
        match self {
            Self::Op | Self::Voice | Self::Ban => true,
            Self::Key | Self::Limit => plus,
            _ => false,
        }
    }

    /// Membership-privilege letters (`o`, `v`) whose argument is a nick.
    pub fn is_prefix_mode(self) -> bool {
        matches!(self, Self::Op | Self::Voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_letter() {
        for c in ['i', 'm', 'n', 'p', 's', 't', 'k', 'l', 'o', 'v', 'b'] {
            let m = ChannelModeChar::from_char(c).unwrap();
            assert_eq!(m.to_char(), c);
        }
        assert!(ChannelModeChar::from_char('z').is_none());
    }

    #[test]
    fn arity_table() {
        use ChannelModeChar::*;
        assert!(Op.takes_arg(true) && Op.takes_arg(false));
        assert!(Voice.takes_arg(true) && Voice.takes_arg(false));
        assert!(Ban.takes_arg(true) && Ban.takes_arg(false));
        assert!(Key.takes_arg(true) && !Key.takes_arg(false));
        assert!(Limit.takes_arg(true) && !Limit.takes_arg(false));
        assert!(!Moderated.takes_arg(true));
    }
}
