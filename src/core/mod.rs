pub mod audio;
pub mod live;
pub mod session;
pub mod tools;

// Re-export commonly used types for convenience
pub use audio::{AudioBuffer, DecodeError, MediaDevices, PlaybackScheduler, WavDevices};
pub use live::{GeminiLive, LiveConnector, LiveError, LiveResult, LiveSetup};
pub use session::{
    AppState, Assistant, Message, SessionError, SessionEvent, SessionOrchestrator, SessionResult,
};
pub use tools::{
    NavigationTarget, Navigator, SystemNavigator, ToolDispatcher, ToolName, ToolResult,
};
