//! PCM16 wire codec for the realtime channel.
//!
//! Outbound microphone blocks are float samples in `[-1, 1]`; the wire carries
//! base64 of 16-bit signed little-endian PCM. Inbound model audio takes the
//! reverse path into a de-interleaved [`AudioBuffer`].

use base64::prelude::*;
use thiserror::Error;

/// Scale between float samples and 16-bit integer PCM.
pub const PCM_SCALE: f32 = 32768.0;

/// Lowest sample rate accepted for inbound audio (telephony band).
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest sample rate accepted for inbound audio.
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Errors raised while decoding an inbound audio payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload was not valid standard base64
    #[error("Invalid base64 audio payload: {0}")]
    InvalidBase64(String),

    /// The byte count does not divide into whole 16-bit frames
    #[error("Audio payload of {len} bytes does not split into 16-bit frames of {channels} channel(s)")]
    MisalignedLength {
        /// Decoded payload length in bytes
        len: usize,
        /// Requested channel count
        channels: usize,
    },

    /// A buffer needs at least one channel
    #[error("Channel count must be at least 1")]
    ZeroChannels,

    /// The declared rate is outside [`MIN_SAMPLE_RATE`]..=[`MAX_SAMPLE_RATE`]
    #[error("Unsupported audio sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),
}

/// Decoded multi-channel audio, one `Vec<f32>` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a single-channel buffer.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    /// A mono buffer of silence lasting `seconds`.
    pub fn silence(sample_rate: u32, seconds: f64) -> Self {
        let frames = (seconds * f64::from(sample_rate)).round() as usize;
        Self::mono(sample_rate, vec![0.0; frames])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Interleave the channels back into one sample stream.
    pub fn interleaved(&self) -> Vec<f32> {
        let count = self.channel_count();
        let mut out = Vec::with_capacity(self.frames() * count);
        for frame in 0..self.frames() {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

/// Quantize one float sample to 16-bit PCM.
///
/// Values are scaled by 32768 and truncated toward zero; `as` saturates, so
/// `1.0` lands on `i16::MAX` instead of wrapping.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    (sample * PCM_SCALE) as i16
}

/// Encode float samples as base64 PCM16 little-endian for the realtime channel.
pub fn encode_outbound(samples: &[f32]) -> String {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        pcm.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    BASE64_STANDARD.encode(pcm)
}

/// Decode a base64 PCM16 payload into a de-interleaved [`AudioBuffer`].
pub fn decode_inbound(
    payload: impl AsRef<[u8]>,
    sample_rate: u32,
    channel_count: usize,
) -> Result<AudioBuffer, DecodeError> {
    if channel_count == 0 {
        return Err(DecodeError::ZeroChannels);
    }
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(DecodeError::UnsupportedSampleRate(sample_rate));
    }

    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;

    if bytes.len() % (2 * channel_count) != 0 {
        return Err(DecodeError::MisalignedLength {
            len: bytes.len(),
            channels: channel_count,
        });
    }

    let frames = bytes.len() / (2 * channel_count);
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for (index, pair) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        channels[index % channel_count].push(f32::from(value) / PCM_SCALE);
    }

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}
