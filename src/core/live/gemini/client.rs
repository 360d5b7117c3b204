//! Gemini Live API WebSocket client.
//!
//! Opening a session sends the `setup` message and waits for `setupComplete`.
//! After that a single transport task pumps outbound client messages onto the
//! socket and forwards inbound frames (text or binary JSON) as
//! [`ChannelEvent`]s until either side closes.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::config::{build_ws_url, model_resource};
use super::messages::{
    AudioTranscriptionConfig, ClientMessage, Content, GenerationConfig, Modality,
    PrebuiltVoiceConfig, ServerMessage, Setup, SpeechConfig, Tool, VoiceConfig,
};
use crate::core::live::base::{
    ChannelEvent, LiveConnection, LiveConnector, LiveError, LiveResult, LiveSetup,
};

/// Channel capacity for outbound client messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// Gemini Live Connector
// =============================================================================

/// Connects sessions to the Gemini Live API.
#[derive(Debug, Clone, Default)]
pub struct GeminiLive;

impl GeminiLive {
    pub fn new() -> Self {
        Self
    }

    /// Translate a [`LiveSetup`] into the wire `setup` message.
    pub fn build_setup(setup: &LiveSetup) -> Setup {
        Setup {
            model: model_resource(&setup.model),
            generation_config: GenerationConfig {
                response_modalities: vec![Modality::Audio],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice.clone(),
                        },
                    },
                }),
            },
            system_instruction: (!setup.system_prompt.is_empty())
                .then(|| Content::text(setup.system_prompt.clone())),
            tools: if setup.tools.is_empty() {
                Vec::new()
            } else {
                vec![Tool {
                    function_declarations: setup.tools.clone(),
                }]
            },
            input_audio_transcription: Some(AudioTranscriptionConfig::default()),
            output_audio_transcription: Some(AudioTranscriptionConfig::default()),
        }
    }

    fn build_request(url: &url::Url) -> LiveResult<http::Request<()>> {
        let host = url
            .host_str()
            .ok_or_else(|| LiveError::InvalidConfiguration("endpoint has no host".to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        http::Request::builder()
            .uri(url.as_str())
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| LiveError::ConnectionFailed(e.to_string()))
    }

    /// Wait for `setupComplete`, answering pings on the way.
    async fn await_setup_complete(sink: &mut WsSink, stream: &mut WsSource) -> LiveResult<()> {
        while let Some(frame) = stream.next().await {
            let frame = frame.map_err(|e| LiveError::WebSocketError(e.to_string()))?;
            let message = match frame {
                Message::Text(text) => parse_server_message(text.as_bytes()),
                Message::Binary(data) => parse_server_message(&data),
                Message::Ping(data) => {
                    let _ = sink.send(Message::Pong(data)).await;
                    continue;
                }
                Message::Close(frame) => return Err(close_error(frame.as_ref(), true)),
                _ => continue,
            };
            match message {
                Ok(message) if message.is_setup_complete() => return Ok(()),
                Ok(_) => debug!("Ignoring message received before setupComplete"),
                Err(e) => warn!("Failed to parse setup reply: {}", e),
            }
        }
        Err(LiveError::ConnectionFailed(
            "connection ended before setupComplete".to_string(),
        ))
    }
}

#[async_trait]
impl LiveConnector for GeminiLive {
    async fn connect(&self, setup: &LiveSetup) -> LiveResult<LiveConnection> {
        if setup.api_key.is_empty() {
            return Err(LiveError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let url = build_ws_url(&setup.endpoint, &setup.api_key)?;
        let request = Self::build_request(&url)?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(response)
                    if matches!(response.status().as_u16(), 401 | 403) =>
                {
                    LiveError::AuthenticationFailed(format!("HTTP {}", response.status()))
                }
                other => LiveError::ConnectionFailed(other.to_string()),
            })?;

        debug!(host = ?url.host_str(), "WebSocket connected, sending setup");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let json = serde_json::to_string(&ClientMessage::Setup(Self::build_setup(setup)))
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        ws_sink
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))?;

        tokio::time::timeout(
            setup.setup_timeout,
            Self::await_setup_complete(&mut ws_sink, &mut ws_stream),
        )
        .await
        .map_err(|_| {
            LiveError::Timeout(format!(
                "no setupComplete within {}ms",
                setup.setup_timeout.as_millis()
            ))
        })??;

        info!(model = %setup.model, voice = %setup.voice, "Connected to Gemini Live API");

        let (tx, rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(EVENT_CHANNEL_CAPACITY);

        let handle = tokio::spawn(run_transport(ws_sink, ws_stream, rx, event_tx));

        Ok(LiveConnection::new(tx, event_rx).with_task(handle))
    }
}

// =============================================================================
// Transport Task
// =============================================================================

async fn run_transport(
    mut ws_sink: WsSink,
    mut ws_stream: WsSource,
    mut rx: mpsc::Receiver<ClientMessage>,
    events: mpsc::Sender<ChannelEvent>,
) {
    loop {
        tokio::select! {
            // Handle outgoing messages
            outgoing = rx.recv() => {
                let Some(message) = outgoing else {
                    debug!("Outbound queue closed, closing WebSocket");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                };

                let json = match serde_json::to_string(&message) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize {}: {}", message.kind(), e);
                        continue;
                    }
                };

                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    error!("Failed to send WebSocket message: {}", e);
                    let _ = events
                        .send(ChannelEvent::Error(LiveError::WebSocketError(e.to_string())))
                        .await;
                    break;
                }
            }

            // Handle incoming messages
            incoming = ws_stream.next() => {
                let frame = match incoming {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        let _ = events
                            .send(ChannelEvent::Error(LiveError::WebSocketError(e.to_string())))
                            .await;
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        let _ = events.send(ChannelEvent::Closed { reason: None }).await;
                        break;
                    }
                };

                let parsed = match frame {
                    Message::Text(text) => parse_server_message(text.as_bytes()),
                    Message::Binary(data) => parse_server_message(&data),
                    Message::Ping(data) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                        }
                        continue;
                    }
                    Message::Close(frame) => {
                        info!(frame = ?frame, "WebSocket closed by server");
                        let event = match frame.as_ref() {
                            Some(f) if !is_clean_close(f.code) => {
                                ChannelEvent::Error(close_error(Some(f), false))
                            }
                            _ => ChannelEvent::Closed {
                                reason: frame
                                    .as_ref()
                                    .map(|f| f.reason.to_string())
                                    .filter(|r| !r.is_empty()),
                            },
                        };
                        let _ = events.send(event).await;
                        break;
                    }
                    _ => continue,
                };

                match parsed {
                    Ok(message) => {
                        if events.send(ChannelEvent::Message(Box::new(message))).await.is_err() {
                            debug!("Event receiver dropped, stopping transport");
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to parse server message: {}", e),
                }
            }
        }
    }
}

fn parse_server_message(bytes: &[u8]) -> LiveResult<ServerMessage> {
    serde_json::from_slice(bytes).map_err(|e| LiveError::ProtocolError(e.to_string()))
}

fn is_clean_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away)
}

/// Map a close frame onto an error.
///
/// The service reports rejected keys and bad setups as policy closes.
fn close_error(frame: Option<&CloseFrame>, during_setup: bool) -> LiveError {
    let Some(frame) = frame else {
        return LiveError::ConnectionFailed("closed without reason".to_string());
    };
    let reason = frame.reason.to_string();
    let lower = reason.to_ascii_lowercase();
    if lower.contains("api key") || lower.contains("permission") || lower.contains("unauth") {
        return LiveError::AuthenticationFailed(reason);
    }
    let detail = format!("{} ({})", reason, u16::from(frame.code));
    if during_setup {
        LiveError::ConnectionFailed(detail)
    } else {
        LiveError::Remote(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::function_declarations;
    use std::time::Duration;

    fn setup() -> LiveSetup {
        LiveSetup {
            api_key: "test-key".to_string(),
            endpoint: super::super::config::GEMINI_LIVE_URL.to_string(),
            model: "gemini-test".to_string(),
            voice: "Zephyr".to_string(),
            system_prompt: "You are a test".to_string(),
            tools: function_declarations(),
            input_sample_rate: 16000,
            setup_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_build_setup() {
        let wire = GeminiLive::build_setup(&setup());
        assert_eq!(wire.model, "models/gemini-test");
        assert_eq!(wire.generation_config.response_modalities, vec![Modality::Audio]);
        assert_eq!(wire.tools[0].function_declarations.len(), 6);
        assert!(wire.input_audio_transcription.is_some());
        assert!(wire.output_audio_transcription.is_some());
        assert_eq!(
            wire.system_instruction.unwrap().parts[0].text.as_deref(),
            Some("You are a test")
        );
    }

    #[test]
    fn test_build_setup_without_prompt_or_tools() {
        let mut bare = setup();
        bare.system_prompt.clear();
        bare.tools.clear();
        let wire = GeminiLive::build_setup(&bare);
        assert!(wire.system_instruction.is_none());
        assert!(wire.tools.is_empty());
    }

    #[test]
    fn test_build_request_sets_host() {
        let url = url::Url::parse("ws://127.0.0.1:9000/live?key=k").unwrap();
        let request = GeminiLive::build_request(&url).unwrap();
        assert_eq!(request.headers()["Host"], "127.0.0.1:9000");
        assert_eq!(request.uri().query(), Some("key=k"));
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let mut no_key = setup();
        no_key.api_key.clear();
        let result = GeminiLive::new().connect(&no_key).await;
        assert!(matches!(result, Err(LiveError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let mut unreachable = setup();
        unreachable.endpoint = "ws://127.0.0.1:1/live".to_string();
        let result = GeminiLive::new().connect(&unreachable).await;
        assert!(matches!(result, Err(LiveError::ConnectionFailed(_))));
    }

    #[test]
    fn test_close_error_classification() {
        let auth = CloseFrame {
            code: CloseCode::Policy,
            reason: "API key not valid. Please pass a valid API key.".to_string().into(),
        };
        assert!(matches!(
            close_error(Some(&auth), true),
            LiveError::AuthenticationFailed(_)
        ));

        let quota = CloseFrame {
            code: CloseCode::Again,
            reason: "quota exceeded".to_string().into(),
        };
        assert_eq!(
            close_error(Some(&quota), false),
            LiveError::Remote("quota exceeded (1013)".to_string())
        );
        assert!(is_clean_close(CloseCode::Normal));
        assert!(!is_clean_close(CloseCode::Policy));
    }
}
