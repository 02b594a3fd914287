// ABOUTME: Typed errors for connection operations and the source tags used by the error channel.
// ABOUTME: Sink and feed failures stay anyhow::Error and are tagged with an ErrorSource when reported.

use std::fmt;

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors returned by connection manager operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid connection state: expected {expected}, was {actual}")]
    InvalidState {
        expected: ConnectionState,
        actual: ConnectionState,
    },

    #[error("handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("message rejected by platform: {reason}")]
    SendRejected { reason: String },

    #[error("client has been disposed")]
    Disposed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn handshake(reason: impl Into<String>) -> Self {
        Self::Handshake {
            reason: reason.into(),
        }
    }

    pub fn send_rejected(reason: impl Into<String>) -> Self {
        Self::SendRejected {
            reason: reason.into(),
        }
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Where a reported error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSource {
    /// Connection lifecycle (open, reconnect, close)
    Connection,
    /// A sink failed to initialize and was dropped from the pipeline
    SinkInitialization { sink: String },
    /// A sink failed while processing a message
    SinkProcessing { sink: String },
    /// A periodic feed failed to poll or deliver
    Feed { feed: String },
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection"),
            Self::SinkInitialization { sink } => write!(f, "sink '{}' initialization", sink),
            Self::SinkProcessing { sink } => write!(f, "sink '{}'", sink),
            Self::Feed { feed } => write!(f, "feed '{}'", feed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_message() {
        let err = ClientError::InvalidState {
            expected: ConnectionState::Established,
            actual: ConnectionState::Connected,
        };
        assert_eq!(
            err.to_string(),
            "invalid connection state: expected established, was connected"
        );
    }

    #[test]
    fn test_error_source_display() {
        assert_eq!(ErrorSource::Connection.to_string(), "connection");
        assert_eq!(
            ErrorSource::SinkProcessing {
                sink: "tfs".to_string()
            }
            .to_string(),
            "sink 'tfs'"
        );
    }
}
