//! Realtime channel to the hosted speech model.

mod base;
pub mod gemini;
pub mod memory;

pub use base::{ChannelEvent, LiveConnection, LiveConnector, LiveError, LiveResult, LiveSetup};
pub use gemini::{ClientMessage, FunctionCall, GeminiLive, InboundEvent, ServerMessage};
pub use memory::{MemoryConnector, MemoryRemote};
