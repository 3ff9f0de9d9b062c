//! Structured error types for Tracelink
//!
//! Provides type-safe error handling with rich context for debugging
//! and a clear split between user-visible and agent-internal failures.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for Tracelink operations
#[derive(Error, Debug)]
pub enum AgentError {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Connecting to the hub failed
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The event channel is closed or was never opened
    #[error("channel unavailable: {reason}")]
    ChannelUnavailable { reason: String },

    /// The hub never acknowledged registration
    #[error("registration timed out after {duration:?}")]
    RegistrationTimeout { duration: Duration },

    // =========================================================================
    // Introspection Errors
    // =========================================================================
    /// Module could not be located in the registry
    #[error("no module named '{module}'")]
    ImportError { module: String },

    /// Any other failure while enumerating module members
    #[error("failed to introspect module '{module}': {message}")]
    Introspection { module: String, message: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl AgentError {
    /// Transport errors are surfaced to the caller of connect and logged,
    /// never retried automatically.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ChannelUnavailable { .. }
                | Self::RegistrationTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using AgentError
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(AgentError::ConnectionFailed {
            message: "refused".to_string()
        }
        .is_transport());

        assert!(AgentError::RegistrationTimeout {
            duration: Duration::from_secs(10)
        }
        .is_transport());

        assert!(!AgentError::ImportError {
            module: "math".to_string()
        }
        .is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = AgentError::ImportError {
            module: "statistics".to_string(),
        };
        assert_eq!(err.to_string(), "no module named 'statistics'");

        let err = AgentError::InvalidConfig {
            message: "hub_url must start with ws://".to_string(),
        };
        assert!(err.to_string().contains("invalid configuration"));
    }
}
