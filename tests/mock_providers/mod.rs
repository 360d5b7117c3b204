//! In-process mock of the Gemini Live service
//!
//! Speaks the BidiGenerateContent wire protocol over a plain `ws://` socket
//! with scripted behaviour per test.

// Not every test binary uses every helper
#![allow(dead_code)]

mod gemini_live_mock;

pub use gemini_live_mock::{GeminiLiveMock, MockBehavior, Received};
