//! Hub command dispatch
//!
//! Consumes the channel's notice stream: registration acknowledgments
//! feed the lifecycle, commands are executed and answered with node
//! execution updates, and the disconnect notice tears the lifecycle
//! down. Code execution runs on its own task so a long snippet cannot
//! stall the dispatcher.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::channel::ChannelNotice;
use crate::monitor::{self, MonitorSpec};
use crate::protocol::{AgentMessage, HubMessage, NodeExecutionUpdate};

pub(crate) fn spawn_dispatcher(agent: Agent, mut notice_rx: mpsc::UnboundedReceiver<ChannelNotice>) {
    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            match notice {
                ChannelNotice::Inbound(message) => dispatch(&agent, message),
                ChannelNotice::Disconnected => {
                    info!("hub connection lost");
                    agent.inner.registry.on_disconnected();
                    break;
                }
            }
        }
        debug!("command dispatcher stopped");
    });
}

fn dispatch(agent: &Agent, message: HubMessage) {
    match message {
        HubMessage::Registered { app_id } => {
            agent.inner.registry.on_registered(app_id);
        }
        HubMessage::ExecuteCode {
            node_id,
            code,
            timeout,
        } => {
            let agent = agent.clone();
            tokio::spawn(async move {
                execute_code(&agent, node_id, code, timeout).await;
            });
        }
        HubMessage::ImportModule {
            node_id,
            module_name,
            alias,
        } => import_module(agent, node_id, module_name, alias),
        HubMessage::MonitorFunction {
            node_id,
            function_name,
            track_params,
            track_return,
        } => {
            let spec = MonitorSpec {
                function_name: function_name.clone(),
                track_params,
                track_return,
            };
            let update = if monitor::spawn_session(agent.clone(), spec) {
                NodeExecutionUpdate::running(node_id, format!("Monitoring {function_name}"))
            } else {
                NodeExecutionUpdate::error(
                    node_id,
                    format!("{function_name} is already being monitored"),
                )
            };
            agent.send(AgentMessage::NodeExecutionUpdate(update));
        }
    }
}

async fn execute_code(agent: &Agent, node_id: String, code: String, timeout: Option<u64>) {
    agent.send(AgentMessage::NodeExecutionUpdate(
        NodeExecutionUpdate::running(&node_id, "Executing code"),
    ));

    let timeout = timeout.map(std::time::Duration::from_secs);
    let outcome = agent.inner.sandbox.execute(&code, timeout).await;

    let update = if outcome.success {
        NodeExecutionUpdate::completed(
            node_id,
            json!({
                "output": outcome.output,
                "variables": outcome.variables,
                "exitCode": outcome.exit_code,
            }),
        )
    } else {
        NodeExecutionUpdate::error(
            node_id,
            outcome
                .error
                .unwrap_or_else(|| "execution failed".to_string()),
        )
    };
    agent.send(AgentMessage::NodeExecutionUpdate(update));
}

fn import_module(agent: &Agent, node_id: String, module_name: String, alias: Option<String>) {
    agent.send(AgentMessage::NodeExecutionUpdate(
        NodeExecutionUpdate::running(&node_id, format!("Importing {module_name}")),
    ));

    let update = match agent.inner.modules.import(&module_name, alias.as_deref()) {
        Ok(result) => NodeExecutionUpdate::completed(node_id, result.to_value()),
        Err(e) => NodeExecutionUpdate::error(node_id, e.to_string()),
    };
    agent.send(AgentMessage::NodeExecutionUpdate(update));
}
