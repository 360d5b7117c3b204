//! In-process connector: the caller plays the remote service.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::base::{ChannelEvent, LiveConnection, LiveConnector, LiveError, LiveResult, LiveSetup};
use super::gemini::messages::{ClientMessage, FunctionResponse, ServerMessage};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct ConnectorState {
    failure: Option<LiveError>,
    remotes: VecDeque<MemoryRemote>,
    connects: usize,
    last_model: Option<String>,
}

/// Connector whose sessions are in-memory channel pairs.
///
/// Every successful connect queues a [`MemoryRemote`] for the test side.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose every connect fails with `error`.
    pub fn failing(error: LiveError) -> Self {
        let connector = Self::default();
        connector.state.lock().failure = Some(error);
        connector
    }

    /// Number of connect attempts so far.
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Model requested by the most recent connect.
    pub fn last_model(&self) -> Option<String> {
        self.state.lock().last_model.clone()
    }

    /// The service side of the oldest session not yet taken.
    pub fn take_remote(&self) -> Option<MemoryRemote> {
        self.state.lock().remotes.pop_front()
    }
}

#[async_trait]
impl LiveConnector for MemoryConnector {
    async fn connect(&self, setup: &LiveSetup) -> LiveResult<LiveConnection> {
        let mut state = self.state.lock();
        state.connects += 1;
        state.last_model = Some(setup.model.clone());
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }

        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.remotes.push_back(MemoryRemote {
            outbound: out_rx,
            inbound: in_tx,
        });
        Ok(LiveConnection::new(out_tx, in_rx))
    }
}

/// Service side of an in-memory session.
pub struct MemoryRemote {
    outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::Sender<ChannelEvent>,
}

impl MemoryRemote {
    /// Deliver a server message to the client.
    pub async fn send(&self, message: ServerMessage) -> LiveResult<()> {
        self.emit(ChannelEvent::Message(Box::new(message))).await
    }

    /// Report a transport failure to the client.
    pub async fn fail(&self, error: LiveError) -> LiveResult<()> {
        self.emit(ChannelEvent::Error(error)).await
    }

    /// Close the session from the service side.
    pub async fn close(&self, reason: Option<String>) -> LiveResult<()> {
        self.emit(ChannelEvent::Closed { reason }).await
    }

    async fn emit(&self, event: ChannelEvent) -> LiveResult<()> {
        self.inbound.send(event).await.map_err(|_| LiveError::Closed)
    }

    /// Next message from the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.outbound.recv().await
    }

    /// Next tool response from the client, skipping audio.
    pub async fn next_tool_response(&mut self) -> Option<FunctionResponse> {
        while let Some(message) = self.outbound.recv().await {
            if let ClientMessage::ToolResponse(mut response) = message
                && !response.function_responses.is_empty()
            {
                return Some(response.function_responses.remove(0));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::gemini::messages::InboundEvent;
    use std::time::Duration;

    fn setup() -> LiveSetup {
        LiveSetup {
            api_key: "k".to_string(),
            endpoint: String::new(),
            model: "m".to_string(),
            voice: "Zephyr".to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            input_sample_rate: 16000,
            setup_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let connector = MemoryConnector::new();
        let mut connection = connector.connect(&setup()).await.unwrap();
        let mut remote = connector.take_remote().unwrap();
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.last_model().as_deref(), Some("m"));

        remote
            .send(serde_json::from_str(r#"{"serverContent": {"turnComplete": true}}"#).unwrap())
            .await
            .unwrap();
        match connection.recv().await {
            Some(ChannelEvent::Message(message)) => {
                assert_eq!(message.into_events(), vec![InboundEvent::TurnComplete]);
            }
            other => panic!("Expected message, got {:?}", other),
        }

        connection
            .send(ClientMessage::audio(&[0.0], 16000))
            .await
            .unwrap();
        assert!(matches!(
            remote.recv().await,
            Some(ClientMessage::RealtimeInput(_))
        ));

        connection.close();
        assert!(remote.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failing_connector() {
        let connector = MemoryConnector::failing(LiveError::Timeout("slow".into()));
        assert!(connector.connect(&setup()).await.is_err());
        assert_eq!(connector.connects(), 1);
        assert!(connector.take_remote().is_none());
    }
}
