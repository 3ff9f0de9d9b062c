//! Agent facade
//!
//! One `Agent` per monitored application: owns the connection
//! lifecycle, the event channel, the value serializer bounds and the
//! module registry. Handles are cheap clones sharing the same inner
//! state, so wrapper builders and background tasks can carry one
//! around freely. There is deliberately no process-wide singleton;
//! the agent is an explicit context object.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::channel::{EventChannel, WsChannel};
use crate::commands;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::introspect::ModuleRegistry;
use crate::lifecycle::{ConnectionRegistry, ConnectionState};
use crate::protocol::{AgentMessage, ExecutionEvent, NodeConnection, WorkflowNode};
use crate::sandbox::Sandbox;
use crate::serialize::ValueSerializer;

/// Interval between registration-state polls during connect
const REGISTER_POLL: Duration = Duration::from_millis(50);

pub(crate) struct AgentInner {
    pub(crate) config: AgentConfig,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) serializer: ValueSerializer,
    pub(crate) modules: ModuleRegistry,
    pub(crate) sandbox: Sandbox,
    /// Function names with an active monitoring session
    pub(crate) monitors: Mutex<HashSet<String>>,
    channel: RwLock<Option<Arc<dyn EventChannel>>>,
}

/// Handle to the per-application instrumentation agent
#[derive(Clone)]
pub struct Agent {
    pub(crate) inner: Arc<AgentInner>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let serializer = ValueSerializer::new(&config.capture);
        let sandbox = Sandbox::new(config.sandbox.default_timeout_secs);
        Ok(Agent {
            inner: Arc::new(AgentInner {
                config,
                registry: ConnectionRegistry::new(),
                serializer,
                modules: ModuleRegistry::with_builtins(),
                sandbox,
                monitors: Mutex::new(HashSet::new()),
                channel: RwLock::new(None),
            }),
        })
    }

    /// Construct an agent over a caller-supplied channel, bypassing the
    /// WebSocket transport. The lifecycle still gates emission.
    pub fn with_channel(config: AgentConfig, channel: Arc<dyn EventChannel>) -> Result<Self> {
        let agent = Self::new(config)?;
        *agent.inner.channel.write() = Some(channel);
        Ok(agent)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.registry.state()
    }

    pub fn app_id(&self) -> Option<String> {
        self.inner.registry.app_id()
    }

    /// Make a module catalog retrievable by the hub's import command
    pub fn register_module(&self, catalog: crate::introspect::ModuleCatalog) {
        self.inner.modules.register(catalog);
    }

    /// Connect to the hub and register this application.
    ///
    /// Resolves once the hub has assigned an application id, or fails
    /// with a transport error. Failures are surfaced here and logged,
    /// never retried automatically.
    pub async fn connect(&self) -> Result<()> {
        self.inner.registry.begin_connect();

        let url = &self.inner.config.hub_url;
        let (channel, notice_rx) = match WsChannel::connect(url).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(%url, error = %e, "failed to connect to hub");
                self.inner.registry.on_disconnected();
                return Err(e);
            }
        };
        let channel: Arc<dyn EventChannel> = Arc::new(channel);
        *self.inner.channel.write() = Some(channel.clone());
        self.inner.registry.on_transport_connected();
        info!(%url, "connected to hub");

        commands::spawn_dispatcher(self.clone(), notice_rx);

        // Registration is requested immediately on transport connect.
        channel.publish(AgentMessage::Register {
            name: self.inner.config.app_name.clone(),
        })?;

        self.wait_until_registered(Duration::from_secs(self.inner.config.register_timeout_secs))
            .await
    }

    async fn wait_until_registered(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.registry.can_publish() {
                return Ok(());
            }
            if self.inner.registry.state() == ConnectionState::Disconnected {
                return Err(AgentError::ConnectionFailed {
                    message: "transport dropped before registration completed".to_string(),
                });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AgentError::RegistrationTimeout { duration: timeout });
            }
            tokio::time::sleep(REGISTER_POLL).await;
        }
    }

    /// Disconnect from the hub and clear the assigned application id
    pub async fn disconnect(&self) {
        let channel = self.inner.channel.write().take();
        if let Some(channel) = channel {
            let _ = channel.shutdown().await;
        }
        self.inner.registry.on_disconnected();
    }

    /// Publish the workflow structure for hub-side visualization
    pub fn define_workflow_nodes(
        &self,
        nodes: Vec<WorkflowNode>,
        connections: Vec<NodeConnection>,
    ) {
        self.send(AgentMessage::NodeData { nodes, connections });
    }

    /// Emit one half of a call record. A no-op (with a local notice)
    /// unless the agent is registered; events are never queued.
    pub(crate) fn emit_execution(&self, event: ExecutionEvent) {
        self.send(AgentMessage::ExecutionData(event));
    }

    /// Gated publish used by every telemetry path. Never fails: drops
    /// are logged locally instead.
    pub(crate) fn send(&self, message: AgentMessage) {
        if !self.inner.registry.can_publish() {
            debug!(state = ?self.inner.registry.state(), "not registered, dropping event");
            return;
        }
        let channel = self.inner.channel.read().clone();
        match channel {
            Some(channel) => {
                if let Err(e) = channel.publish(message) {
                    debug!(error = %e, "event channel rejected message");
                }
            }
            None => debug!("no channel attached, dropping event"),
        }
    }

    pub(crate) fn serializer(&self) -> &ValueSerializer {
        &self.inner.serializer
    }

    /// Describe a value serde cannot structurally render, under the
    /// configured capture bounds. The descriptor carries the type name,
    /// owning module, truncated `Debug` form and an optional size, and
    /// slots into a [`crate::intercept::ManualCall`] parameter or
    /// return value.
    pub fn capture_opaque<T: std::fmt::Debug + ?Sized>(
        &self,
        value: &T,
        size: Option<usize>,
    ) -> serde_json::Value {
        self.inner.serializer.serialize_opaque(value, size)
    }

    /// Drive the lifecycle straight to `Registered` without a transport.
    #[cfg(test)]
    pub(crate) fn force_registered(&self) {
        self.inner.registry.begin_connect();
        self.inner.registry.on_transport_connected();
        self.inner.registry.on_registered("app-test".to_string());
    }
}

/// Current wall-clock time as milliseconds since the epoch
pub(crate) fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;

    fn test_agent() -> (Agent, Arc<MemoryChannel>) {
        let channel = Arc::new(MemoryChannel::new());
        let agent = Agent::with_channel(AgentConfig::new("Test App"), channel.clone()).unwrap();
        (agent, channel)
    }

    #[test]
    fn test_events_dropped_until_registered() {
        let (agent, channel) = test_agent();

        // Disconnected: dropped, no error.
        agent.define_workflow_nodes(vec![], vec![]);
        assert!(channel.is_empty());

        // Connected but not yet registered: still dropped.
        agent.inner.registry.begin_connect();
        agent.inner.registry.on_transport_connected();
        agent.define_workflow_nodes(vec![], vec![]);
        assert!(channel.is_empty());

        // Registered: flows.
        agent.inner.registry.on_registered("app-1".to_string());
        agent.define_workflow_nodes(vec![], vec![]);
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_capture_opaque_flows_through_manual_tracking() {
        let (agent, channel) = test_agent();
        agent.force_registered();

        let handle = std::time::Duration::from_millis(7);
        let descriptor = agent.capture_opaque(&handle, Some(16));
        assert_eq!(descriptor["type"], "Duration");
        assert_eq!(descriptor["size"], serde_json::json!(16));

        agent.track(crate::intercept::ManualCall::new("open_handle").parameter("handle", descriptor.clone()));

        let messages = channel.take();
        assert_eq!(messages.len(), 2);
        match &messages[0] {
            AgentMessage::ExecutionData(ExecutionEvent::CallEnter { parameters, .. }) => {
                assert_eq!(parameters["handle"], descriptor);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AgentConfig::new("App").with_hub_url("not-a-url");
        assert!(Agent::new(config).is_err());
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let (agent, channel) = test_agent();
        agent.force_registered();
        assert!(agent.app_id().is_some());

        agent.disconnect().await;
        assert_eq!(agent.state(), ConnectionState::Disconnected);
        assert!(agent.app_id().is_none());

        // Emission after disconnect is a silent no-op.
        agent.define_workflow_nodes(vec![], vec![]);
        assert!(channel.is_empty());
    }
}
