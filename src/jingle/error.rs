//! Jingle session error types.

use std::fmt;

use jinglecore::StanzaError;
use thiserror::Error;

use super::state::PeerState;
use crate::request::IqError;

/// Coarse classification a [`MediaNegotiator`](super::media::MediaNegotiator)
/// attaches to its failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorKind {
    General,
    IllegalArgument,
    IllegalState,
    NotSupported,
    Network,
}

impl fmt::Display for MediaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::General => "general",
            Self::IllegalArgument => "illegal-argument",
            Self::IllegalState => "illegal-state",
            Self::NotSupported => "not-supported",
            Self::Network => "network",
        })
    }
}

/// A media negotiation or streaming failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(MediaErrorKind::General, message)
    }
}

#[derive(Debug, Error)]
pub enum JingleError {
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("no response to the transfer request")]
    TransferTimeout,

    #[error("transfer rejected by remote: {0}")]
    TransferRejected(String),

    #[error("{operation} is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: PeerState,
    },

    #[error("session already has id {0}")]
    SidAlreadyAssigned(String),

    #[error("malformed jingle stanza: {0}")]
    Stanza(#[from] StanzaError),

    #[error(transparent)]
    Iq(#[from] IqError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("container error: {0}")]
    Container(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_display_includes_kind() {
        let err = MediaError::new(MediaErrorKind::NotSupported, "no common codec");
        assert_eq!(err.to_string(), "not-supported: no common codec");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = JingleError::InvalidState {
            operation: "answer",
            state: PeerState::Connected,
        };
        assert_eq!(err.to_string(), "answer is not valid in state Connected");
    }
}
