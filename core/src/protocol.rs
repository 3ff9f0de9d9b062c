//! Hub wire protocol
//!
//! JSON message types exchanged with the runtime hub over the event
//! channel. Every message is an `{ "event": ..., "data": ... }`
//! envelope; field names follow the hub's camelCase convention. The
//! hub-side event names for code execution, function monitoring and
//! module import are kept verbatim for compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages published by the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AgentMessage {
    /// First message after the transport connects; announces the identity name
    Register { name: String },
    /// Call telemetry, emitted only once registered
    ExecutionData(ExecutionEvent),
    /// Workflow structure for hub-side visualization
    NodeData {
        nodes: Vec<WorkflowNode>,
        connections: Vec<NodeConnection>,
    },
    /// Progress/result report for a hub-issued command
    NodeExecutionUpdate(NodeExecutionUpdate),
    /// Periodic synthetic statistics for a monitored function
    FunctionMonitoringData(FunctionMonitoringData),
}

/// Commands and acknowledgments received from the hub
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HubMessage {
    /// Registration acknowledgment carrying the assigned application id
    #[serde(rename_all = "camelCase")]
    Registered { app_id: String },

    /// Run a snippet in the sandbox and report its observable effects
    #[serde(rename = "execute_python_code", rename_all = "camelCase")]
    ExecuteCode {
        node_id: String,
        code: String,
        /// Seconds; the agent's configured default applies when absent
        timeout: Option<u64>,
    },

    /// Start a periodic monitoring session for a named function
    #[serde(rename = "monitor_python_function", rename_all = "camelCase")]
    MonitorFunction {
        node_id: String,
        function_name: String,
        track_params: bool,
        track_return: bool,
    },

    /// Introspect a registered module catalog
    #[serde(rename = "import_python_module", rename_all = "camelCase")]
    ImportModule {
        node_id: String,
        module_name: String,
        alias: Option<String>,
    },
}

/// One half of a correlated call record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    #[serde(rename_all = "camelCase")]
    CallEnter {
        call_id: String,
        function_name: String,
        /// Milliseconds since the epoch
        timestamp: f64,
        parameters: serde_json::Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    CallExit {
        call_id: String,
        function_name: String,
        timestamp: f64,
        /// Milliseconds, end − start
        duration: f64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_value: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack_trace: Option<String>,
    },
}

impl ExecutionEvent {
    /// Correlation id shared by the enter/exit pair
    pub fn call_id(&self) -> &str {
        match self {
            ExecutionEvent::CallEnter { call_id, .. } => call_id,
            ExecutionEvent::CallExit { call_id, .. } => call_id,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            ExecutionEvent::CallEnter { timestamp, .. } => *timestamp,
            ExecutionEvent::CallExit { timestamp, .. } => *timestamp,
        }
    }
}

/// A hub-side visual unit corresponding to an agent capability
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub x: f64,
    pub y: f64,
}

/// Directed edge between two workflow nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConnection {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionUpdate {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeExecutionUpdate {
    pub fn running(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        NodeExecutionUpdate {
            node_id: node_id.into(),
            status: NodeStatus::Running,
            message: Some(message.into()),
            result: None,
            error: None,
        }
    }

    pub fn completed(node_id: impl Into<String>, result: Value) -> Self {
        NodeExecutionUpdate {
            node_id: node_id.into(),
            status: NodeStatus::Completed,
            message: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(node_id: impl Into<String>, error: impl Into<String>) -> Self {
        NodeExecutionUpdate {
            node_id: node_id.into(),
            status: NodeStatus::Error,
            message: None,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMonitoringData {
    pub function_name: String,
    pub track_params: bool,
    pub track_return: bool,
    pub status: String,
    pub call_count: u64,
    pub avg_execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_call_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_wire_shape() {
        let msg = AgentMessage::Register {
            name: "Demo App".to_string(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, json!({"event": "register", "data": {"name": "Demo App"}}));
    }

    #[test]
    fn test_call_enter_camel_case_fields() {
        let msg = AgentMessage::ExecutionData(ExecutionEvent::CallEnter {
            call_id: "abc".to_string(),
            function_name: "math.add".to_string(),
            timestamp: 1_700_000_000_000.0,
            parameters: serde_json::Map::new(),
        });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["event"], "execution_data");
        assert_eq!(v["data"]["type"], "call_enter");
        assert_eq!(v["data"]["callId"], "abc");
        assert_eq!(v["data"]["functionName"], "math.add");
        assert!(v["data"].get("call_id").is_none());
    }

    #[test]
    fn test_call_exit_omits_absent_fields() {
        let msg = AgentMessage::ExecutionData(ExecutionEvent::CallExit {
            call_id: "abc".to_string(),
            function_name: "math.add".to_string(),
            timestamp: 1_700_000_000_100.0,
            duration: 100.0,
            success: true,
            return_value: Some(json!(8)),
            error: None,
            stack_trace: None,
        });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["data"]["returnValue"], json!(8));
        assert!(v["data"].get("error").is_none());
        assert!(v["data"].get("stackTrace").is_none());
    }

    #[test]
    fn test_hub_command_wire_names() {
        let raw = json!({
            "event": "execute_python_code",
            "data": {"nodeId": "n1", "code": "print(1)", "timeout": 5}
        });
        let msg: HubMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            msg,
            HubMessage::ExecuteCode {
                node_id: "n1".to_string(),
                code: "print(1)".to_string(),
                timeout: Some(5),
            }
        );

        let raw = json!({
            "event": "import_python_module",
            "data": {"nodeId": "n2", "moduleName": "math", "alias": null}
        });
        let msg: HubMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(msg, HubMessage::ImportModule { .. }));
    }

    #[test]
    fn test_registered_ack_round_trip() {
        let raw = json!({"event": "registered", "data": {"appId": "app-7"}});
        let msg: HubMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            msg,
            HubMessage::Registered {
                app_id: "app-7".to_string()
            }
        );
    }

    #[test]
    fn test_node_execution_update_constructors() {
        let upd = NodeExecutionUpdate::error("n1", "boom");
        let v = serde_json::to_value(&upd).unwrap();
        assert_eq!(v, json!({"nodeId": "n1", "status": "error", "error": "boom"}));

        let upd = NodeExecutionUpdate::running("n1", "Executing code...");
        assert_eq!(upd.status, NodeStatus::Running);
    }
}
