//! Error types for the docent assistant runtime.
//!
//! Every fallible operation in this crate returns [`DocentError`] (via the
//! crate-level [`Result`](crate::Result) alias). The taxonomy mirrors the
//! round protocol: errors that originate inside a tool call are *recoverable*
//! and are converted to tool-result data before they ever reach the loop
//! boundary, while gateway-level failures are *fatal to the round* but leave
//! the transcript in a resumable state.
//!
//! # Classification
//!
//! ```rust
//! use docent::DocentError;
//!
//! let err = DocentError::tool_not_found("mystery_tool");
//! assert!(err.is_recoverable());
//! assert!(!err.is_round_fatal());
//! ```

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::provider::error::ProviderError;
use crate::store::schema::SchemaViolation;

/// Primary error type for all docent operations.
#[derive(Error, Debug, Clone)]
pub enum DocentError {
    /// Model backend unreachable, timed out, or returned a malformed reply.
    /// Fatal to the current round; the transcript stays valid for retry.
    #[error("Gateway failure: {message}")]
    Gateway { message: String },

    /// A tool call named a tool no provider registered. Recoverable: the
    /// dispatcher converts this to a failure tool result, it never crosses
    /// the loop boundary.
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// The resolved executor reported a failure. Recoverable, same treatment
    /// as [`ToolNotFound`](Self::ToolNotFound).
    #[error("Tool execution failed: {name}: {message}")]
    ToolExecutionFailure { name: String, message: String },

    /// A guarded write diverged from the collection's schema baseline.
    /// Recoverable: surfaced to the model so it can extend the schema.
    #[error("Schema violation: {violation}")]
    SchemaViolation { violation: SchemaViolation },

    /// No session exists under the presented key. Rejected at the boundary,
    /// before any round runs.
    #[error("Session not found: {key}")]
    SessionNotFound { key: String },

    /// The presented identity does not match the identity bound to the
    /// session. Rejected at the boundary.
    #[error("Identity mismatch for session {key}")]
    IdentityMismatch { key: String },

    /// The defensive round cap tripped before the model produced a text-only
    /// reply.
    #[error("Round limit exceeded after {limit} rounds")]
    MaxRoundsExceeded { limit: u32 },

    /// The caller cancelled an in-flight round. Pending tool calls were
    /// completed with synthesized failure results, so the transcript keeps
    /// its pairs.
    #[error("Round cancelled: {message}")]
    Cancelled { message: String },

    /// Provider connection, handshake, or protocol failure.
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// Invalid or unusable configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Invalid input from the caller of a public API.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DocentError {
    /// Create a gateway error.
    pub fn gateway<S: Into<String>>(message: S) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    /// Create a tool-not-found error.
    pub fn tool_not_found<S: Into<String>>(name: S) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a tool execution failure.
    pub fn tool_execution_failure<S: Into<String>, M: Into<String>>(name: S, message: M) -> Self {
        Self::ToolExecutionFailure {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a schema violation error.
    pub fn schema_violation(violation: SchemaViolation) -> Self {
        Self::SchemaViolation { violation }
    }

    /// Create a session-not-found error.
    pub fn session_not_found<S: Into<String>>(key: S) -> Self {
        Self::SessionNotFound { key: key.into() }
    }

    /// Create an identity-mismatch error.
    pub fn identity_mismatch<S: Into<String>>(key: S) -> Self {
        Self::IdentityMismatch { key: key.into() }
    }

    /// Create a round-limit error.
    pub fn max_rounds_exceeded(limit: u32) -> Self {
        Self::MaxRoundsExceeded { limit }
    }

    /// Create a cancellation error.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider<S: Into<String>>(message: S) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid-input error.
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for errors that are converted to tool-result data inside a round
    /// rather than crossing the loop boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound { .. }
                | Self::ToolExecutionFailure { .. }
                | Self::SchemaViolation { .. }
        )
    }

    /// True for errors that abort the current round. For all of these the
    /// transcript is left pair-complete and the caller may retry the same
    /// session.
    pub fn is_round_fatal(&self) -> bool {
        matches!(
            self,
            Self::Gateway { .. } | Self::MaxRoundsExceeded { .. } | Self::Cancelled { .. }
        )
    }

    /// True for errors raised at the session boundary, before any round runs.
    pub fn is_boundary_rejection(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound { .. } | Self::IdentityMismatch { .. }
        )
    }
}

impl From<GatewayError> for DocentError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway {
            message: err.to_string(),
        }
    }
}

impl From<ProviderError> for DocentError {
    fn from(err: ProviderError) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }
}

impl From<SchemaViolation> for DocentError {
    fn from(violation: SchemaViolation) -> Self {
        Self::SchemaViolation { violation }
    }
}

impl From<crate::config::ConfigError> for DocentError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DocentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = DocentError::tool_not_found("lookup");
        assert!(matches!(err, DocentError::ToolNotFound { ref name } if name == "lookup"));
        assert_eq!(err.to_string(), "Tool not found: lookup");

        let err = DocentError::tool_execution_failure("insert_document", "store unavailable");
        assert_eq!(
            err.to_string(),
            "Tool execution failed: insert_document: store unavailable"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(DocentError::tool_not_found("x").is_recoverable());
        assert!(DocentError::tool_execution_failure("x", "y").is_recoverable());
        assert!(!DocentError::gateway("down").is_recoverable());
        assert!(!DocentError::session_not_found("s1").is_recoverable());
    }

    #[test]
    fn test_round_fatal_classification() {
        assert!(DocentError::gateway("down").is_round_fatal());
        assert!(DocentError::max_rounds_exceeded(12).is_round_fatal());
        assert!(DocentError::cancelled("client disconnect").is_round_fatal());
        assert!(!DocentError::tool_not_found("x").is_round_fatal());
    }

    #[test]
    fn test_boundary_classification() {
        assert!(DocentError::session_not_found("s1").is_boundary_rejection());
        assert!(DocentError::identity_mismatch("s1").is_boundary_rejection());
        assert!(!DocentError::gateway("down").is_boundary_rejection());
    }

    #[test]
    fn test_gateway_error_conversion() {
        let gw = GatewayError::network("connection refused");
        let err: DocentError = gw.into();
        assert!(err.is_round_fatal());
        assert!(err.to_string().contains("connection refused"));
    }
}
