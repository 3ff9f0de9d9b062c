//! Event channel
//!
//! Outward-facing publish surface for the agent. The production
//! implementation is a WebSocket client; a writer task owns the sink
//! so publishing is a plain non-blocking channel send and interceptors
//! never await. Inbound hub traffic and transport-level disconnect
//! notices are surfaced through a notice stream consumed by the
//! command dispatcher.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::protocol::{AgentMessage, HubMessage};

/// Transport-level notifications delivered alongside inbound messages
#[derive(Debug)]
pub enum ChannelNotice {
    /// A parsed hub command or acknowledgment
    Inbound(HubMessage),
    /// The transport dropped; the lifecycle must move to Disconnected
    Disconnected,
}

/// Publish surface consumed by interceptors and the dispatcher.
///
/// `publish` must not block or await; implementations queue and fail
/// fast when the transport is gone.
#[async_trait]
pub trait EventChannel: Send + Sync {
    fn publish(&self, message: AgentMessage) -> Result<()>;

    /// Flush and close the underlying transport.
    async fn shutdown(&self) -> Result<()>;
}

enum Outbound {
    Message(Box<AgentMessage>),
    Shutdown,
}

/// WebSocket channel to the hub
pub struct WsChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    writer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    /// Dial the hub. On success the returned receiver yields inbound
    /// hub messages and the eventual disconnect notice.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<ChannelNotice>)> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| AgentError::ConnectionFailed {
                message: e.to_string(),
            })?;
        debug!(%url, "websocket transport established");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel::<ChannelNotice>();

        let writer = tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                match item {
                    Outbound::Message(msg) => {
                        let json = match serde_json::to_string(&msg) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "dropping unserializable outbound message");
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Shutdown => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<HubMessage>(&text) {
                        Ok(inbound) => {
                            if notice_tx.send(ChannelNotice::Inbound(inbound)).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "ignoring unrecognized hub message");
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = notice_tx.send(ChannelNotice::Disconnected);
        });

        Ok((
            WsChannel {
                outbound: outbound_tx,
                writer: tokio::sync::Mutex::new(Some(writer)),
            },
            notice_rx,
        ))
    }
}

#[async_trait]
impl EventChannel for WsChannel {
    fn publish(&self, message: AgentMessage) -> Result<()> {
        self.outbound
            .send(Outbound::Message(Box::new(message)))
            .map_err(|_| AgentError::ChannelUnavailable {
                reason: "writer task stopped".to_string(),
            })
    }

    async fn shutdown(&self) -> Result<()> {
        let _ = self.outbound.send(Outbound::Shutdown);
        if let Some(handle) = self.writer.lock().await.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// In-memory channel for single-process use
///
/// Records every published message, suitable for unit tests and for
/// host applications that want to observe telemetry without a hub.
#[derive(Default)]
pub struct MemoryChannel {
    messages: Mutex<Vec<AgentMessage>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn messages(&self) -> Vec<AgentMessage> {
        self.messages.lock().clone()
    }

    /// Drain the recorded messages
    pub fn take(&self) -> Vec<AgentMessage> {
        std::mem::take(&mut self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    fn publish(&self, message: AgentMessage) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_channel_records_in_order() {
        let channel = MemoryChannel::new();
        channel
            .publish(AgentMessage::Register {
                name: "a".to_string(),
            })
            .unwrap();
        channel
            .publish(AgentMessage::Register {
                name: "b".to_string(),
            })
            .unwrap();

        let messages = channel.take();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            AgentMessage::Register {
                name: "a".to_string()
            }
        );
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_hub_fails() {
        // Port 9 (discard) is not listening in the test environment.
        let err = WsChannel::connect("ws://127.0.0.1:9").await.err().unwrap();
        assert!(err.is_transport());
    }
}
