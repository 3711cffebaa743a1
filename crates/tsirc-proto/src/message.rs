//! IRC message parsing and serialization.
//!
//! A wire line is `[:prefix] COMMAND [args...] [:trailing]`. Commands
//! are kept as strings rather than a closed enum: the daemon routes on
//! the verb and owns the per-command argument semantics.

use std::fmt;
use thiserror::Error;

/// Message parse failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("prefix without command")]
    PrefixOnly,
}

/// The origin of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// `:server.name` — provenance of a server-originated line.
    Server(String),
    /// `:nick!user@host` — a user origin.
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl Prefix {
    /// Parse a prefix token (without the leading `:`).
    ///
    /// Anything carrying `!` or `@` is a user prefix; a bare token with
    /// a dot is a server name; a bare token without one is a nick with
    /// unknown user/host (as relayed by old peers).
    pub fn parse(s: &str) -> Prefix {
        if let Some((nick, rest)) = s.split_once('!') {
            let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
            Prefix::User {
                nick: nick.to_string(),
                user: user.to_string(),
                host: host.to_string(),
            }
        } else if let Some((nick, host)) = s.split_once('@') {
            Prefix::User {
                nick: nick.to_string(),
                user: String::new(),
                host: host.to_string(),
            }
        } else if s.contains('.') {
            Prefix::Server(s.to_string())
        } else {
            Prefix::User {
                nick: s.to_string(),
                user: String::new(),
                host: String::new(),
            }
        }
    }

    /// The name clients see as the message source.
    pub fn name(&self) -> &str {
        match self {
            Prefix::Server(s) => s,
            Prefix::User { nick, .. } => nick,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(s) => write!(f, "{}", s),
            Prefix::User { nick, user, host } => {
                write!(f, "{}", nick)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

/// A parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
    /// Render the last parameter as `:trailing` even when nothing forces
    /// it. Some grammars (SJOIN member lists) require the colon on a
    /// single space-free token.
    pub force_trailing: bool,
}

impl Message {
    /// Build a message with no prefix.
    pub fn new(command: &str, params: Vec<String>) -> Message {
        Message {
            prefix: None,
            command: command.to_string(),
            params,
            force_trailing: false,
        }
    }

    /// Build a message with the given prefix.
    pub fn with_prefix(prefix: Prefix, command: &str, params: Vec<String>) -> Message {
        Message {
            prefix: Some(prefix),
            command: command.to_string(),
            params,
            force_trailing: false,
        }
    }

    /// Parse one wire line (CRLF already stripped or not — both accepted).
    pub fn parse(line: &str) -> Result<Message, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut rest = line.trim_start();
        if rest.is_empty() {
            return Err(ParseError::Empty);
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (token, tail) = stripped.split_once(' ').ok_or(ParseError::PrefixOnly)?;
            rest = tail.trim_start();
            Some(Prefix::parse(token))
        } else {
            None
        };

        if rest.is_empty() {
            return Err(ParseError::PrefixOnly);
        }

        let mut params = Vec::new();
        let command;
        match rest.split_once(' ') {
            Some((cmd, tail)) => {
                command = cmd.to_uppercase();
                let mut tail = tail.trim_start();
                while !tail.is_empty() {
                    if let Some(trailing) = tail.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match tail.split_once(' ') {
                        Some((arg, next)) => {
                            params.push(arg.to_string());
                            tail = next.trim_start();
                        }
                        None => {
                            params.push(tail.to_string());
                            break;
                        }
                    }
                }
            }
            None => command = rest.to_uppercase(),
        }

        Ok(Message {
            prefix,
            command,
            params,
            force_trailing: false,
        })
    }

    /// Positional argument accessor.
    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }
}

impl fmt::Display for Message {
    /// Render without line terminator. The last parameter is emitted as
    /// trailing whenever it is empty, contains a space, or starts with
    /// `:`, so `parse(render(m)) == m`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)?;
        if let Some((last, init)) = self.params.split_last() {
            for arg in init {
                write!(f, " {}", arg)?;
            }
            if self.force_trailing
                || last.is_empty()
                || last.contains(' ')
                || last.starts_with(':')
            {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}
