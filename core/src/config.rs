//! Agent configuration
//!
//! Loading and validation of the agent's YAML config file. Everything
//! has a sensible default so an agent can be constructed from just an
//! application name.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

/// Default hub address when nothing is configured.
pub const DEFAULT_HUB_URL: &str = "ws://localhost:3000";

/// Tracelink agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identity name reported to the hub during registration
    pub app_name: String,

    /// WebSocket address of the runtime hub
    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    /// Seconds to wait for the hub to acknowledge registration
    #[serde(default = "default_register_timeout")]
    pub register_timeout_secs: u64,

    /// Value capture bounds
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Sandbox execution settings
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Bounds applied when rendering parameter/result values for transmission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Max elements kept per sequence or mapping
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Max characters of an opaque object's textual form
    #[serde(default = "default_max_repr")]
    pub max_repr: usize,
    /// Recursion depth before degrading to an opaque descriptor
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Default timeout for hub-submitted snippets, in seconds
    #[serde(default = "default_sandbox_timeout")]
    pub default_timeout_secs: u64,
}

fn default_hub_url() -> String {
    DEFAULT_HUB_URL.to_string()
}

fn default_register_timeout() -> u64 {
    10
}

fn default_max_items() -> usize {
    10
}

fn default_max_repr() -> usize {
    200
}

fn default_max_depth() -> usize {
    16
}

fn default_sandbox_timeout() -> u64 {
    30
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            max_items: default_max_items(),
            max_repr: default_max_repr(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            default_timeout_secs: default_sandbox_timeout(),
        }
    }
}

impl AgentConfig {
    /// Create a config with defaults for the given application name
    pub fn new(app_name: impl Into<String>) -> Self {
        AgentConfig {
            app_name: app_name.into(),
            hub_url: default_hub_url(),
            register_timeout_secs: default_register_timeout(),
            capture: CaptureConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }

    /// Override the hub address
    pub fn with_hub_url(mut self, url: impl Into<String>) -> Self {
        self.hub_url = url.into();
        self
    }

    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig =
            serde_yml::from_str(&content).map_err(|e| AgentError::InvalidConfig {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults for `app_name`
    pub fn load_or_default(app_name: &str) -> Self {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                if let Ok(config) = Self::load(&path) {
                    return config;
                }
            }
        }
        Self::new(app_name)
    }

    /// Default config file path (`<config dir>/tracelink/agent.yml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tracelink").join("agent.yml"))
    }

    /// Reject configs the agent cannot act on
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(AgentError::InvalidConfig {
                message: "app_name must not be empty".to_string(),
            });
        }
        if !self.hub_url.starts_with("ws://") && !self.hub_url.starts_with("wss://") {
            return Err(AgentError::InvalidConfig {
                message: format!("hub_url must be a ws:// or wss:// address, got '{}'", self.hub_url),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::new("Demo App");
        assert_eq!(config.app_name, "Demo App");
        assert_eq!(config.hub_url, DEFAULT_HUB_URL);
        assert_eq!(config.capture.max_items, 10);
        assert_eq!(config.capture.max_repr, 200);
        assert_eq!(config.sandbox.default_timeout_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app_name: File App").unwrap();
        writeln!(file, "hub_url: ws://hub.internal:4000").unwrap();
        writeln!(file, "capture:").unwrap();
        writeln!(file, "  max_items: 5").unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.app_name, "File App");
        assert_eq!(config.hub_url, "ws://hub.internal:4000");
        assert_eq!(config.capture.max_items, 5);
        // Unspecified fields fall back to defaults
        assert_eq!(config.capture.max_repr, 200);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = AgentConfig::new("App").with_hub_url("http://localhost:3000");
        assert!(matches!(
            config.validate(),
            Err(AgentError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = AgentConfig::new("  ");
        assert!(config.validate().is_err());
    }
}
