pub mod agent;
pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod intercept;
pub mod introspect;
pub mod lifecycle;
pub mod monitor;
pub mod protocol;
pub mod sandbox;
pub mod serialize;

// Re-exports for convenience
pub use agent::Agent;
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use intercept::ManualCall;
pub use lifecycle::ConnectionState;
