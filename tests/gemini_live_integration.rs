//! Gemini Live client and full-session tests against an in-process mock server.

mod mock_providers;

use std::sync::Arc;
use std::time::Duration;

use jarvis_core::config::AssistantConfig;
use jarvis_core::core::audio::MemoryDevices;
use jarvis_core::core::live::{ClientMessage, GeminiLive, LiveConnector, LiveError, LiveSetup};
use jarvis_core::core::session::{
    AppState, Assistant, Message, SESSION_ERROR_MESSAGE, SessionOrchestrator,
};
use jarvis_core::core::tools::{NavigationTarget, RecordingNavigator, function_declarations};
use mock_providers::{GeminiLiveMock, MockBehavior};
use serde_json::json;

fn setup(endpoint: String, timeout: Duration) -> LiveSetup {
    LiveSetup {
        api_key: "test-key".to_string(),
        endpoint,
        model: "gemini-test".to_string(),
        voice: "Zephyr".to_string(),
        system_prompt: "You are a test".to_string(),
        tools: function_declarations(),
        input_sample_rate: 16000,
        setup_timeout: timeout,
    }
}

async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {}", what);
}

// =============================================================================
// Client
// =============================================================================

#[tokio::test]
async fn test_connect_sends_setup_and_streams_audio() {
    let mock = GeminiLiveMock::start(MockBehavior::Listen).await;
    let mut connection = GeminiLive::new()
        .connect(&setup(mock.endpoint(), Duration::from_secs(2)))
        .await
        .unwrap();

    let received = mock.wait_for(|r| !r.setups.is_empty()).await;
    let sent = &received.setups[0];
    assert_eq!(sent["model"], "models/gemini-test");
    assert_eq!(sent["generationConfig"]["responseModalities"], json!(["AUDIO"]));
    assert_eq!(
        sent["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Zephyr"
    );
    assert_eq!(sent["systemInstruction"]["parts"][0]["text"], "You are a test");
    assert_eq!(
        sent["tools"][0]["functionDeclarations"]
            .as_array()
            .map(Vec::len),
        Some(6)
    );
    assert_eq!(sent["inputAudioTranscription"], json!({}));
    assert_eq!(sent["outputAudioTranscription"], json!({}));

    connection
        .send(ClientMessage::audio(&[0.0; 160], 16000))
        .await
        .unwrap();
    mock.wait_for(|r| r.audio_chunks == 1).await;

    connection.close();
    mock.wait_for(|r| r.closes == 1).await;
    assert!(connection.is_closed());
}

#[tokio::test]
async fn test_rejected_key_is_authentication_failure() {
    let mock = GeminiLiveMock::start(MockBehavior::RejectKey).await;
    let result = GeminiLive::new()
        .connect(&setup(mock.endpoint(), Duration::from_secs(2)))
        .await;

    match result {
        Err(LiveError::AuthenticationFailed(reason)) => assert!(reason.contains("API key")),
        other => panic!("Expected AuthenticationFailed, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_missing_setup_complete_times_out() {
    let mock = GeminiLiveMock::start(MockBehavior::Silent).await;
    let result = GeminiLive::new()
        .connect(&setup(mock.endpoint(), Duration::from_millis(200)))
        .await;

    assert!(matches!(result, Err(LiveError::Timeout(_))));
    assert_eq!(mock.received().setups.len(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    // Grab a free port and release it again
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = GeminiLive::new()
        .connect(&setup(format!("ws://{}/ws", addr), Duration::from_secs(1)))
        .await;

    assert!(matches!(result, Err(LiveError::ConnectionFailed(_))));
}

// =============================================================================
// Full session
// =============================================================================

fn assistant_for(
    mock: &GeminiLiveMock,
    devices: &MemoryDevices,
    navigator: &RecordingNavigator,
) -> Assistant {
    let mut config = AssistantConfig::default();
    config.api_key = "test-key".to_string();
    config.endpoint = mock.endpoint();
    config.capture_block_size = 160;
    config.setup_timeout_ms = 2000;

    let orchestrator = SessionOrchestrator::from_config(
        &config,
        Arc::new(GeminiLive::new()),
        Arc::new(devices.clone()),
        Arc::new(navigator.clone()),
    );
    Assistant::new(orchestrator, config.tool_log_capacity)
}

#[tokio::test]
async fn test_voice_command_opens_site_and_speaks() {
    let mock = GeminiLiveMock::start(MockBehavior::Conversation).await;
    let devices = MemoryDevices::new();
    let navigator = RecordingNavigator::new();
    let assistant = assistant_for(&mock, &devices, &navigator);

    assistant.activate().await.unwrap();
    assert_eq!(assistant.state(), AppState::Listening);

    // First microphone block triggers the scripted turn
    assert!(devices.capture(vec![0.1; 160]));

    let received = mock.wait_for(|r| !r.tool_responses.is_empty()).await;
    let response = &received.tool_responses[0]["functionResponses"][0];
    assert_eq!(response["id"], "call-1");
    assert_eq!(response["name"], "openUrl");
    assert_eq!(response["response"]["result"], r#"{"success":true}"#);
    assert_eq!(
        navigator.targets(),
        vec![NavigationTarget::current("https://youtube.com")]
    );

    eventually("the turn to be logged", || assistant.messages().len() == 2).await;
    assert_eq!(
        assistant.messages(),
        vec![
            Message::user("open youtube"),
            Message::assistant("Opening YouTube.")
        ]
    );
    assert_eq!(
        assistant.tool_log(),
        vec![r#"openUrl → {"url":"youtube.com"}"#.to_string()]
    );

    // 2400 samples at 24 kHz
    eventually("the reply to be scheduled", || devices.played().len() == 1).await;
    let chunk = devices.played()[0].clone();
    assert!((chunk.duration - 0.1).abs() < 1e-9);
    eventually("speaking", || assistant.state() == AppState::Speaking).await;

    assert!(devices.finish(chunk.id));
    eventually("playback to drain", || assistant.state() == AppState::Listening).await;

    assistant.deactivate().await;
    assert_eq!(assistant.state(), AppState::Idle);
    assert!(assistant.messages().is_empty());
    mock.wait_for(|r| r.closes == 1).await;

    let released = devices.release_counts();
    assert_eq!(
        (released.microphone, released.input, released.output),
        (1, 1, 1)
    );
}

#[tokio::test]
async fn test_remote_failure_ends_session_with_message() {
    let mock = GeminiLiveMock::start(MockBehavior::FailAfterSetup).await;
    let devices = MemoryDevices::new();
    let navigator = RecordingNavigator::new();
    let assistant = assistant_for(&mock, &devices, &navigator);

    assistant.activate().await.unwrap();

    eventually("the session to end", || !assistant.is_active()).await;
    assert_eq!(assistant.state(), AppState::Idle);
    assert_eq!(
        assistant.messages(),
        vec![Message::assistant(SESSION_ERROR_MESSAGE)]
    );
    eventually("devices to be released", || {
        devices.release_counts().output == 1
    })
    .await;
    assert_eq!(devices.release_counts().microphone, 1);
}

#[tokio::test]
async fn test_toggle_twice_reconnects() {
    let mock = GeminiLiveMock::start(MockBehavior::Listen).await;
    let devices = MemoryDevices::new();
    let navigator = RecordingNavigator::new();
    let assistant = assistant_for(&mock, &devices, &navigator);

    assert_eq!(assistant.toggle().await.unwrap(), AppState::Listening);
    assert_eq!(assistant.toggle().await.unwrap(), AppState::Idle);
    assert_eq!(assistant.toggle().await.unwrap(), AppState::Listening);

    let received = mock.wait_for(|r| r.setups.len() == 2 && r.closes >= 1).await;
    assert_eq!(received.connections, 2);

    assistant.deactivate().await;
}
