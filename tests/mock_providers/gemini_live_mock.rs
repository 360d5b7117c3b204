//! WebSocket mock server for the Gemini Live API

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// What the mock does after receiving `setup`.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Acknowledge setup, then answer the first audio chunk with one scripted
    /// turn: user transcript, an `openUrl` tool call, and after the tool
    /// response an assistant transcript, one audio chunk and turnComplete.
    Conversation,
    /// Acknowledge setup and only record what arrives.
    Listen,
    /// Reject the key with a policy close before setupComplete.
    RejectKey,
    /// Never acknowledge setup.
    Silent,
    /// Acknowledge setup, then fail the session with an internal-error close.
    FailAfterSetup,
}

/// Everything the mock saw from its clients.
#[derive(Debug, Default, Clone)]
pub struct Received {
    pub setups: Vec<Value>,
    pub audio_chunks: usize,
    pub tool_responses: Vec<Value>,
    pub closes: usize,
    /// Accepted WebSocket connections
    pub connections: usize,
}

struct MockState {
    behavior: MockBehavior,
    received: Mutex<Received>,
    activity: Notify,
}

/// Running mock server bound to an ephemeral local port.
pub struct GeminiLiveMock {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: tokio::task::JoinHandle<()>,
}

impl GeminiLiveMock {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockState {
            behavior,
            received: Mutex::new(Received::default()),
            activity: Notify::new(),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        eprintln!("Mock connection error: {}", e);
                    }
                });
            }
        });

        Self { addr, state, task }
    }

    /// Endpoint to put into the client configuration.
    pub fn endpoint(&self) -> String {
        format!("ws://{}/ws/live", self.addr)
    }

    pub fn received(&self) -> Received {
        self.state.received.lock().clone()
    }

    /// Wait until `condition` holds for what has been received.
    pub async fn wait_for<F: Fn(&Received) -> bool>(&self, condition: F) -> Received {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.state.activity.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let received = self.state.received.lock();
                    if condition(&received) {
                        return received.clone();
                    }
                }
                notified.await;
            }
        })
        .await
        .expect("mock did not receive the expected messages")
    }
}

impl Drop for GeminiLiveMock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 100 ms of a 440 Hz tone as 24 kHz PCM16, base64 encoded.
pub fn reply_audio() -> String {
    let bytes: Vec<u8> = (0..2400)
        .flat_map(|i| {
            let t = i as f32 / 24000.0;
            let sample = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
            sample.to_le_bytes()
        })
        .collect();
    BASE64_STANDARD.encode(bytes)
}

async fn send_json(write: &mut WsSink, value: Value) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    write.send(Message::Text(value.to_string().into())).await
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();
    state.received.lock().connections += 1;

    let mut replied = false;

    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
                continue;
            }
            Ok(Message::Close(_)) => {
                state.received.lock().closes += 1;
                state.activity.notify_waiters();
                break;
            }
            Err(e) => {
                // Clients may drop the socket right after their close frame
                state.received.lock().closes += 1;
                state.activity.notify_waiters();
                eprintln!("Mock WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        if let Some(setup) = message.get("setup") {
            state.received.lock().setups.push(setup.clone());
            state.activity.notify_waiters();
            match state.behavior {
                MockBehavior::RejectKey => {
                    write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Policy,
                            reason: "API key not valid. Please pass a valid API key."
                                .to_string()
                                .into(),
                        })))
                        .await?;
                    break;
                }
                MockBehavior::Silent => continue,
                MockBehavior::FailAfterSetup => {
                    send_json(&mut write, json!({"setupComplete": {}})).await?;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Error,
                            reason: "Internal error encountered.".to_string().into(),
                        })))
                        .await?;
                    break;
                }
                MockBehavior::Conversation | MockBehavior::Listen => {
                    send_json(&mut write, json!({"setupComplete": {}})).await?;
                }
            }
        } else if message.get("realtimeInput").is_some() {
            state.received.lock().audio_chunks += 1;
            state.activity.notify_waiters();

            if matches!(state.behavior, MockBehavior::Conversation) && !replied {
                replied = true;
                send_json(
                    &mut write,
                    json!({"serverContent": {"inputTranscription": {"text": "open youtube"}}}),
                )
                .await?;
                send_json(
                    &mut write,
                    json!({"toolCall": {"functionCalls": [
                        {"id": "call-1", "name": "openUrl", "args": {"url": "youtube.com"}}
                    ]}}),
                )
                .await?;
            }
        } else if let Some(response) = message.get("toolResponse") {
            state.received.lock().tool_responses.push(response.clone());
            state.activity.notify_waiters();

            if matches!(state.behavior, MockBehavior::Conversation) {
                send_json(
                    &mut write,
                    json!({"serverContent": {"outputTranscription": {"text": "Opening YouTube."}}}),
                )
                .await?;
                send_json(
                    &mut write,
                    json!({"serverContent": {"modelTurn": {"parts": [
                        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": reply_audio()}}
                    ]}}}),
                )
                .await?;
                send_json(&mut write, json!({"serverContent": {"turnComplete": true}})).await?;
            }
        }
    }

    Ok(())
}
