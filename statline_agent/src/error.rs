//! Error taxonomy for a collector session. Every variant ends the current
//! connection; the retry driver decides what to log and then reconnects.

use std::fmt;
use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The collector said something the handshake does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Credentials were sent but the collector did not accept them.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Anything else that broke a streaming tick (metrics, serialization).
    #[error("{0}")]
    Unclassified(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProtocolViolation,
    AuthenticationFailure,
    Transport,
    Unclassified,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            AgentError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            AgentError::Transport(_) => ErrorKind::Transport,
            AgentError::Unclassified(_) => ErrorKind::Unclassified,
        }
    }

    pub(crate) fn timed_out(what: &str) -> Self {
        AgentError::Transport(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{what} timed out"),
        ))
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Unclassified(e.into())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ProtocolViolation => "protocol",
            ErrorKind::AuthenticationFailure => "auth",
            ErrorKind::Transport => "transport",
            ErrorKind::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}
