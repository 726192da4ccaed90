//! Provider communication errors.
//!
//! Failures split along the lines the caller cares about: transport faults
//! and lost connections are retryable by reconnecting, protocol and
//! serialization failures are not, and timeouts carry the duration that was
//! exceeded.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to an external capability provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The underlying transport failed (spawn, socket, I/O).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider answered, but not with what the protocol allows.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// A message could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// No response arrived within the request timeout.
    #[error("request timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The connection dropped while requests were outstanding.
    #[error("connection lost: {message}")]
    ConnectionLost { message: String },

    /// The initialize exchange did not complete.
    #[error("handshake failed: {message}")]
    Handshake { message: String },

    /// An operation was attempted before `connect` succeeded.
    #[error("not connected: {message}")]
    NotConnected { message: String },
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            message: message.into(),
        }
    }

    /// Whether reconnecting could plausibly clear the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionLost { .. } | Self::Transport { .. }
        )
    }
}
