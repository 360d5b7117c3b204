//! In-memory audio devices.
//!
//! Nothing touches real hardware: capture blocks are pushed by the owner,
//! playback is recorded with its schedule, and the playback clock only moves
//! when told to. Used for headless runs and tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::codec::AudioBuffer;
use super::device::{
    AudioContext, AudioOutput, ChunkId, DeviceError, MediaAccessError, MediaDevices,
    MicrophoneStream,
};

/// Capacity of the capture block channel.
const CAPTURE_CHANNEL_CAPACITY: usize = 64;

/// One chunk handed to the playback context.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedChunk {
    pub id: ChunkId,
    pub start_at: f64,
    pub duration: f64,
}

/// How many times each owned handle was released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseCounts {
    pub microphone: usize,
    pub input: usize,
    pub output: usize,
}

#[derive(Default)]
struct MemoryState {
    deny: Option<MediaAccessError>,
    clock: f64,
    capture_tx: Option<mpsc::Sender<Vec<f32>>>,
    completions: Option<mpsc::UnboundedSender<ChunkId>>,
    played: Vec<PlayedChunk>,
    stopped: Vec<ChunkId>,
    releases: ReleaseCounts,
}

/// Shared handle over a set of in-memory devices.
#[derive(Clone, Default)]
pub struct MemoryDevices {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices whose microphone request always fails with `error`.
    pub fn denying(error: MediaAccessError) -> Self {
        let devices = Self::default();
        devices.state.lock().deny = Some(error);
        devices
    }

    /// Move the playback clock.
    pub fn set_time(&self, seconds: f64) {
        self.state.lock().clock = seconds;
    }

    /// Push one captured block. Returns false until capture has started.
    pub fn capture(&self, block: Vec<f32>) -> bool {
        let tx = self.state.lock().capture_tx.clone();
        match tx {
            Some(tx) => tx.try_send(block).is_ok(),
            None => false,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().capture_tx.is_some()
    }

    /// Report that a chunk played to its end.
    pub fn finish(&self, id: ChunkId) -> bool {
        let completions = self.state.lock().completions.clone();
        completions.is_some_and(|tx| tx.send(id).is_ok())
    }

    pub fn played(&self) -> Vec<PlayedChunk> {
        self.state.lock().played.clone()
    }

    pub fn stopped(&self) -> Vec<ChunkId> {
        self.state.lock().stopped.clone()
    }

    pub fn release_counts(&self) -> ReleaseCounts {
        self.state.lock().releases
    }
}

struct MemoryMicrophone {
    state: Arc<Mutex<MemoryState>>,
    live: bool,
}

impl MicrophoneStream for MemoryMicrophone {
    fn start(&mut self, _block_size: usize) -> Result<mpsc::Receiver<Vec<f32>>, DeviceError> {
        if !self.live {
            return Err(DeviceError::Closed);
        }
        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        self.state.lock().capture_tx = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.capture_tx = None;
        state.releases.microphone += 1;
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

struct MemoryInput {
    state: Arc<Mutex<MemoryState>>,
    sample_rate: u32,
    closed: bool,
}

impl AudioContext for MemoryInput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        self.state.lock().releases.input += 1;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct MemoryOutput {
    state: Arc<Mutex<MemoryState>>,
    sample_rate: u32,
    closed: bool,
}

impl AudioContext for MemoryOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.releases.output += 1;
        state.completions = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl AudioOutput for MemoryOutput {
    fn current_time(&self) -> f64 {
        self.state.lock().clock
    }

    fn play(
        &mut self,
        id: ChunkId,
        buffer: &AudioBuffer,
        start_at: f64,
    ) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.state.lock().played.push(PlayedChunk {
            id,
            start_at,
            duration: buffer.duration(),
        });
        Ok(())
    }

    fn stop(&mut self, id: ChunkId) {
        self.state.lock().stopped.push(id);
    }
}

#[async_trait]
impl MediaDevices for MemoryDevices {
    async fn get_user_media(&self) -> Result<Box<dyn MicrophoneStream>, MediaAccessError> {
        if let Some(err) = self.state.lock().deny.clone() {
            return Err(err);
        }
        Ok(Box::new(MemoryMicrophone {
            state: self.state.clone(),
            live: true,
        }))
    }

    fn create_input_context(&self, sample_rate: u32) -> Result<Box<dyn AudioContext>, DeviceError> {
        Ok(Box::new(MemoryInput {
            state: self.state.clone(),
            sample_rate,
            closed: false,
        }))
    }

    fn create_output_context(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>, DeviceError> {
        self.state.lock().completions = Some(completions);
        Ok(Box::new(MemoryOutput {
            state: self.state.clone(),
            sample_rate,
            closed: false,
        }))
    }
}
