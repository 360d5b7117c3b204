//! Audio path of a session: PCM codec, device capabilities and playback scheduling.

pub mod codec;
pub mod device;
pub mod memory;
pub mod playback;
pub mod wav;

pub use codec::{
    AudioBuffer, DecodeError, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, PCM_SCALE, decode_inbound,
    encode_outbound, quantize,
};
pub use device::{
    AudioContext, AudioOutput, ChunkId, DeviceError, MediaAccessError, MediaDevices,
    MicrophoneStream,
};
pub use memory::{MemoryDevices, PlayedChunk, ReleaseCounts};
pub use playback::{PlaybackScheduler, ScheduledChunk};
pub use wav::{WavDevices, read_wav_mono, resample};
