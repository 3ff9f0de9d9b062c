//! Function monitoring sessions
//!
//! A hub-issued monitoring command starts a background session that
//! periodically reports statistics for the named function until the
//! agent disconnects. Statistics are synthesized from the session's
//! own tick counter; the wire shape matches what hub dashboards chart.

use std::time::Duration;

use tracing::{debug, info};

use crate::agent::{now_ms, Agent};
use crate::lifecycle::ConnectionState;
use crate::protocol::{AgentMessage, FunctionMonitoringData};

const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub(crate) struct MonitorSpec {
    pub function_name: String,
    pub track_params: bool,
    pub track_return: bool,
}

/// Start a session for `spec`. Returns false when a session for the
/// same function already runs; the existing one keeps its counters.
pub(crate) fn spawn_session(agent: Agent, spec: MonitorSpec) -> bool {
    {
        let mut active = agent.inner.monitors.lock();
        if !active.insert(spec.function_name.clone()) {
            debug!(function = %spec.function_name, "monitoring session already active");
            return false;
        }
    }
    info!(function = %spec.function_name, "starting monitoring session");
    tokio::spawn(run_session(agent, spec));
    true
}

async fn run_session(agent: Agent, spec: MonitorSpec) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    let mut call_count: u64 = 0;
    let mut total_time: f64 = 0.0;

    loop {
        ticker.tick().await;
        if agent.state() == ConnectionState::Disconnected {
            break;
        }

        call_count += 1;
        // Deterministic per-tick variation keeps the charts alive
        // without pretending to be real measurements.
        total_time += 8.0 + (call_count % 7) as f64 * 1.5;

        agent.send(AgentMessage::FunctionMonitoringData(
            FunctionMonitoringData {
                function_name: spec.function_name.clone(),
                track_params: spec.track_params,
                track_return: spec.track_return,
                status: "monitoring".to_string(),
                call_count,
                avg_execution_time: total_time / call_count as f64,
                last_call_time: Some(now_ms()),
            },
        ));
    }

    agent.inner.monitors.lock().remove(&spec.function_name);
    info!(function = %spec.function_name, "monitoring session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::config::AgentConfig;
    use std::sync::Arc;

    fn registered_agent() -> (Agent, Arc<MemoryChannel>) {
        let channel = Arc::new(MemoryChannel::new());
        let agent = Agent::with_channel(AgentConfig::new("Test App"), channel.clone()).unwrap();
        agent.force_registered();
        (agent, channel)
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let (agent, _channel) = registered_agent();
        let spec = MonitorSpec {
            function_name: "f".to_string(),
            track_params: true,
            track_return: false,
        };
        assert!(spawn_session(agent.clone(), spec.clone()));
        assert!(!spawn_session(agent, spec));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_emits_and_stops_on_disconnect() {
        let (agent, channel) = registered_agent();
        let spec = MonitorSpec {
            function_name: "orders.process".to_string(),
            track_params: true,
            track_return: true,
        };
        assert!(spawn_session(agent.clone(), spec.clone()));

        // The interval's first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let messages = channel.take();
        let reports: Vec<&FunctionMonitoringData> = messages
            .iter()
            .filter_map(|m| match m {
                AgentMessage::FunctionMonitoringData(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].function_name, "orders.process");
        assert_eq!(reports[0].call_count, 1);
        assert!(reports[0].avg_execution_time > 0.0);

        agent.disconnect().await;
        // The next tick observes the dropped lifecycle, ends the
        // session and frees the name for a future request.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(spawn_session(agent, spec));
    }
}
