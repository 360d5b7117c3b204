//! Audio hardware capabilities injected into a session.
//!
//! A session owns exactly three hardware handles: the microphone stream, the
//! capture context and the playback context. Implementations decide what the
//! hardware actually is (sound card, WAV file, memory).

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::codec::AudioBuffer;

/// Identifier of one scheduled playback chunk.
pub type ChunkId = u64;

/// Errors reported by audio devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device could not be opened
    #[error("Audio device unavailable: {0}")]
    Unavailable(String),

    /// Reading or writing audio failed
    #[error("Audio device I/O error: {0}")]
    Io(String),

    /// The device was already closed
    #[error("Audio device is closed")]
    Closed,
}

/// Microphone access failures. Activation aborts before any remote connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaAccessError {
    /// The user or platform refused access
    #[error("Microphone access denied: {0}")]
    Denied(String),

    /// No capture device exists
    #[error("Microphone not found: {0}")]
    NotFound(String),
}

/// A live microphone stream.
pub trait MicrophoneStream: Send {
    /// Begin delivering captured blocks of `block_size` mono samples in `[-1, 1]`.
    ///
    /// The receiver ends when the stream is stopped or the source runs dry.
    fn start(&mut self, block_size: usize) -> Result<mpsc::Receiver<Vec<f32>>, DeviceError>;

    /// Stop every track of the stream.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// A hardware audio context running at a fixed sample rate.
pub trait AudioContext: Send {
    fn sample_rate(&self) -> u32;

    /// Release the context. Callers check [`AudioContext::is_closed`] first.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// A playback context that can start and stop buffers on its own clock.
///
/// Chunks that finish naturally are reported by sending their id on the
/// completion channel handed to [`MediaDevices::create_output_context`].
/// Stopped chunks are not reported.
pub trait AudioOutput: AudioContext {
    /// The device clock in seconds.
    fn current_time(&self) -> f64;

    /// Start `buffer` at device time `start_at`.
    fn play(&mut self, id: ChunkId, buffer: &AudioBuffer, start_at: f64)
    -> Result<(), DeviceError>;

    /// Stop a chunk immediately. Unknown or finished ids are ignored.
    fn stop(&mut self, id: ChunkId);
}

/// Factory for the audio hardware a session needs.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Ask for the microphone.
    async fn get_user_media(&self) -> Result<Box<dyn MicrophoneStream>, MediaAccessError>;

    /// Open the capture context.
    fn create_input_context(&self, sample_rate: u32) -> Result<Box<dyn AudioContext>, DeviceError>;

    /// Open the playback context.
    fn create_output_context(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>, DeviceError>;
}
