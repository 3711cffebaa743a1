//! Unified error handling for tsircd.
//!
//! Every layer signals failure through explicit `Result` values: handler
//! errors turn into a numeric reply (or a disconnect) at the dispatch
//! boundary, link errors are fatal for the link that raised them and for
//! nothing else.

use thiserror::Error;

/// Errors that can occur while handling a client command.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("no such nick: {0}")]
    NoSuchNick(String),

    #[error("not on channel: {0}")]
    NotOnChannel(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    #[error("link failed: {0}")]
    Link(#[from] LinkError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Static label for structured log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::NicknameInUse(_) => "nickname_in_use",
            Self::ErroneousNickname(_) => "erroneous_nickname",
            Self::NoSuchChannel(_) => "no_such_channel",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::NotOnChannel(_) => "not_on_channel",
            Self::UnknownCommand(_) => "unknown_command",
            Self::Quit(_) => "quit",
            Self::Link(_) => "link_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Errors that end the connection rather than producing a reply.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Quit(_) | Self::Link(_))
    }
}

/// Fatal, non-retryable link failures.
///
/// A link that raises one of these is condemned and swept by the
/// teardown reaper; it is never throttled or retried.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("sendq exceeded: {queued} queued > {limit} limit")]
    SendQExceeded { queued: usize, limit: usize },

    #[error("link closed")]
    Closed,
}

pub type HandlerResult = Result<(), HandlerError>;
