//! Gapless sequential playback of model audio.
//!
//! Every chunk starts where the previous one ends (or now, if the device clock
//! has already passed that point). The scheduler tracks which chunks are still
//! sounding so the session knows when the assistant stopped speaking, and so a
//! barge-in can cut everything off at once.

use std::collections::HashSet;

use super::codec::AudioBuffer;
use super::device::{AudioOutput, ChunkId, DeviceError};

/// Placement of one enqueued chunk on the device timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Serializes decoded chunks into continuous playback.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    cursor: f64,
    active: HashSet<ChunkId>,
    next_id: ChunkId,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device time at which the next chunk will start, at the earliest.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: ChunkId) -> bool {
        self.active.contains(&id)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Schedule `buffer` right after everything already queued.
    ///
    /// On device failure nothing is recorded and the cursor does not move.
    pub fn enqueue(
        &mut self,
        output: &mut dyn AudioOutput,
        buffer: &AudioBuffer,
    ) -> Result<ScheduledChunk, DeviceError> {
        let id = self.next_id;
        let start_at = self.cursor.max(output.current_time());
        let duration = buffer.duration();

        output.play(id, buffer, start_at)?;

        self.next_id += 1;
        self.cursor = start_at + duration;
        self.active.insert(id);

        tracing::trace!(
            chunk_id = id,
            start_at,
            duration,
            active = self.active.len(),
            "Scheduled playback chunk"
        );

        Ok(ScheduledChunk {
            id,
            start_at,
            duration,
        })
    }

    /// Record that a chunk finished playing on its own.
    ///
    /// Returns true when this completion emptied the active set. Ids that were
    /// already flushed by [`PlaybackScheduler::interrupt`] are ignored.
    pub fn complete(&mut self, id: ChunkId) -> bool {
        if !self.active.remove(&id) {
            tracing::trace!(chunk_id = id, "Ignoring completion of flushed chunk");
            return false;
        }
        self.active.is_empty()
    }

    /// Stop every sounding chunk and rewind the cursor. Returns how many were stopped.
    pub fn interrupt(&mut self, output: &mut dyn AudioOutput) -> usize {
        let stopped = self.active.len();
        for id in self.active.drain() {
            output.stop(id);
        }
        self.cursor = 0.0;
        tracing::debug!(stopped, "Playback interrupted");
        stopped
    }
}
