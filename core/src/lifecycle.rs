//! Connection lifecycle
//!
//! Small state machine tracking whether the agent is registered with
//! the hub. Telemetry may only be published once the hub has assigned
//! an application id; before that, emissions are dropped with a local
//! notice, never buffered.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Registration states, in connection order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state; also re-entered on any disconnect
    Disconnected,
    /// Transport dial in progress
    Connecting,
    /// Transport is up, registration not yet acknowledged
    Connected,
    /// Hub assigned an application id; telemetry may flow
    Registered,
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    app_id: Option<String>,
}

/// Shared connection status, mutated only by lifecycle transition
/// handlers. Interceptors read it to decide whether to publish.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            inner: RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                app_id: None,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    pub fn app_id(&self) -> Option<String> {
        self.inner.read().app_id.clone()
    }

    /// Both conditions must hold or events would reach the hub
    /// unattributed.
    pub fn can_publish(&self) -> bool {
        let inner = self.inner.read();
        inner.state == ConnectionState::Registered && inner.app_id.is_some()
    }

    /// `Disconnected` → `Connecting`, when the transport dial starts
    pub fn begin_connect(&self) {
        let mut inner = self.inner.write();
        if inner.state != ConnectionState::Disconnected {
            warn!(state = ?inner.state, "connect requested while not disconnected");
            return;
        }
        inner.state = ConnectionState::Connecting;
        debug!("connection state: connecting");
    }

    /// `Connecting` → `Connected`, on the transport-level acknowledgment.
    /// The caller must immediately request registration.
    pub fn on_transport_connected(&self) {
        let mut inner = self.inner.write();
        if inner.state != ConnectionState::Connecting {
            warn!(state = ?inner.state, "transport connected in unexpected state");
        }
        inner.state = ConnectionState::Connected;
        debug!("connection state: connected, awaiting registration");
    }

    /// `Connected` → `Registered`, when the hub assigns an application id
    pub fn on_registered(&self, app_id: String) {
        let mut inner = self.inner.write();
        if inner.state != ConnectionState::Connected {
            warn!(state = ?inner.state, %app_id, "registration ack in unexpected state, ignoring");
            return;
        }
        info!(%app_id, "registered with hub");
        inner.state = ConnectionState::Registered;
        inner.app_id = Some(app_id);
    }

    /// Any state → `Disconnected`; clears the assigned application id
    pub fn on_disconnected(&self) {
        let mut inner = self.inner.write();
        if inner.state != ConnectionState::Disconnected {
            info!("disconnected from hub");
        }
        inner.state = ConnectionState::Disconnected;
        inner.app_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_transition_sequence() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.state(), ConnectionState::Disconnected);
        assert!(!registry.can_publish());

        registry.begin_connect();
        assert_eq!(registry.state(), ConnectionState::Connecting);

        registry.on_transport_connected();
        assert_eq!(registry.state(), ConnectionState::Connected);
        assert!(!registry.can_publish());

        registry.on_registered("app-42".to_string());
        assert_eq!(registry.state(), ConnectionState::Registered);
        assert_eq!(registry.app_id().as_deref(), Some("app-42"));
        assert!(registry.can_publish());
    }

    #[test]
    fn test_disconnect_clears_app_id_from_any_state() {
        let registry = ConnectionRegistry::new();
        registry.begin_connect();
        registry.on_transport_connected();
        registry.on_registered("app-42".to_string());

        registry.on_disconnected();
        assert_eq!(registry.state(), ConnectionState::Disconnected);
        assert!(registry.app_id().is_none());
        assert!(!registry.can_publish());
    }

    #[test]
    fn test_out_of_order_registration_is_ignored() {
        let registry = ConnectionRegistry::new();
        // No connect happened; a stray ack must not unlock publishing.
        registry.on_registered("app-42".to_string());
        assert_eq!(registry.state(), ConnectionState::Disconnected);
        assert!(!registry.can_publish());
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let registry = ConnectionRegistry::new();
        registry.begin_connect();
        registry.on_transport_connected();
        registry.on_registered("a".to_string());
        registry.on_disconnected();

        registry.begin_connect();
        registry.on_transport_connected();
        registry.on_registered("b".to_string());
        assert_eq!(registry.app_id().as_deref(), Some("b"));
    }
}
