//! Mode delta vocabulary and the bounded output token buffer.
//!
//! The mode delta engine itself lives on the channel actor
//! (`state::actor::modes`); this module holds the pieces it shares with
//! the merge engine: the requester privilege tier, the outcome summary
//! reported back to the requester, and [`ModeWriter`] — the output
//! buffer that enforces the wire line budget at the serialization
//! boundary instead of with pointer arithmetic.

/// Privilege tier of a mode-change requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// A member (or non-member) without channel privileges.
    None,
    /// A local channel operator.
    ChanOp,
    /// A server or service origin; bypasses privilege checks and the
    /// per-request mode ceiling.
    Server,
}

impl Privilege {
    pub fn may_set(self) -> bool {
        matches!(self, Privilege::ChanOp | Privilege::Server)
    }

    pub fn is_server(self) -> bool {
        matches!(self, Privilege::Server)
    }
}

/// Result of applying one mode request.
///
/// Error conditions are latched, not counted: privilege violations and
/// missing parameters are each reported to the requester once per
/// request no matter how many tokens tripped them.
#[derive(Debug, Default)]
pub struct ModeOutcome {
    pub tokens: String,
    pub params: Vec<String>,
    pub privs_rejected: bool,
    pub missing_param: bool,
    /// Unknown letters seen, deduplicated; empty for server origins.
    pub unknown: Vec<char>,
}

impl ModeOutcome {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Note an unknown letter, once per distinct letter.
    pub fn note_unknown(&mut self, letter: char) {
        if !self.unknown.contains(&letter) {
            self.unknown.push(letter);
        }
    }
}

/// Canonical mode token buffer bounded by a byte budget.
///
/// The budget is what remains of the wire line after the fixed prefix
/// (`:origin MODE #channel `) and CRLF. A push that would overflow it
/// fails and the token is dropped whole — never truncated mid-token.
#[derive(Debug)]
pub struct ModeWriter {
    budget: usize,
    tokens: String,
    params: Vec<String>,
    params_len: usize,
    /// Direction of the last emitted token; a sign flip costs one byte.
    sign: Option<bool>,
}

impl ModeWriter {
    pub fn new(budget: usize) -> ModeWriter {
        ModeWriter {
            budget,
            tokens: String::new(),
            params: Vec::new(),
            params_len: 0,
            sign: None,
        }
    }

    /// Byte budget for corrective/mode lines fanned out with the given
    /// origin prefix, e.g. `:irc.example.net MODE #chan `.
    pub fn line_budget(origin: &str, channel: &str) -> usize {
        let overhead = 1 + origin.len() + 1 + "MODE".len() + 1 + channel.len() + 1 + 2;
        tsirc_proto::MAX_LINE_LEN.saturating_sub(overhead)
    }

    fn projected(&self, plus: bool, param: Option<&str>) -> usize {
        let sign_cost = if self.sign == Some(plus) { 0 } else { 1 };
        let param_cost = param.map(|p| p.len() + 1).unwrap_or(0);
        self.tokens.len() + self.params_len + sign_cost + 1 + param_cost
    }

    /// Append one validated change. Returns false (dropping the token)
    /// if it would overflow the budget.
    pub fn push(&mut self, plus: bool, letter: char, param: Option<&str>) -> bool {
        if self.projected(plus, param) > self.budget {
            return false;
        }
        if self.sign != Some(plus) {
            self.tokens.push(if plus { '+' } else { '-' });
            self.sign = Some(plus);
        }
        self.tokens.push(letter);
        if let Some(p) = param {
            self.params_len += p.len() + 1;
            self.params.push(p.to_string());
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.chars().filter(|c| !matches!(c, '+' | '-')).count()
    }

    /// Consume the buffer into `(tokens, params)`.
    pub fn finish(self) -> (String, Vec<String>) {
        (self.tokens, self.params)
    }
}
