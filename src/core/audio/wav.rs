//! WAV-file backed audio devices for running a session without a sound card.
//!
//! The microphone replays a WAV file in real-time paced blocks. The playback
//! context renders every scheduled chunk at its scheduled offset into one WAV
//! timeline, written out when the context closes, and reports completion on
//! the wall clock like real hardware would.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{AudioBuffer, quantize};
use super::device::{
    AudioContext, AudioOutput, ChunkId, DeviceError, MediaAccessError, MediaDevices,
    MicrophoneStream,
};

/// Capacity of the capture block channel.
const CAPTURE_CHANNEL_CAPACITY: usize = 32;

/// Read a WAV file as mono float samples, returning them with the file's sample rate.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), hound::Error> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|s| s as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    let channels = usize::from(spec.channels.max(1));
    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}

/// Resample with linear interpolation.
///
/// A zero rate on either side leaves the samples untouched.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let new_len = (samples.len() as f64 / ratio) as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let idx1 = (idx0 + 1).min(samples.len() - 1);
        let frac = src_idx - idx0 as f64;

        let sample = f64::from(samples[idx0]) * (1.0 - frac) + f64::from(samples[idx1]) * frac;
        resampled.push(sample as f32);
    }
    resampled
}

/// Audio devices backed by WAV files.
#[derive(Debug, Clone)]
pub struct WavDevices {
    input: PathBuf,
    output: Option<PathBuf>,
    capture_rate: u32,
}

impl WavDevices {
    /// `input` feeds the microphone (resampled to `capture_rate`); `output`, if
    /// set, receives the rendered playback when the session closes.
    pub fn new(input: impl Into<PathBuf>, output: Option<PathBuf>, capture_rate: u32) -> Self {
        Self {
            input: input.into(),
            output,
            capture_rate,
        }
    }
}

#[async_trait]
impl MediaDevices for WavDevices {
    async fn get_user_media(&self) -> Result<Box<dyn MicrophoneStream>, MediaAccessError> {
        let path = self.input.clone();
        let (samples, rate) = tokio::task::spawn_blocking(move || read_wav_mono(&path))
            .await
            .map_err(|e| MediaAccessError::Denied(e.to_string()))?
            .map_err(|e| match e {
                hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    MediaAccessError::NotFound(self.input.display().to_string())
                }
                other => MediaAccessError::NotFound(format!(
                    "{}: {}",
                    self.input.display(),
                    other
                )),
            })?;

        let samples = resample(&samples, rate, self.capture_rate);
        info!(
            path = %self.input.display(),
            source_rate = rate,
            capture_rate = self.capture_rate,
            samples = samples.len(),
            "Opened WAV microphone"
        );

        Ok(Box::new(WavMicrophone {
            samples: Arc::new(samples),
            sample_rate: self.capture_rate,
            task: None,
            live: true,
        }))
    }

    fn create_input_context(&self, sample_rate: u32) -> Result<Box<dyn AudioContext>, DeviceError> {
        Ok(Box::new(WavInputContext {
            sample_rate,
            closed: false,
        }))
    }

    fn create_output_context(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>, DeviceError> {
        if sample_rate == 0 {
            return Err(DeviceError::Unavailable(
                "output sample rate must be non-zero".to_string(),
            ));
        }
        Ok(Box::new(WavOutput {
            sample_rate,
            path: self.output.clone(),
            started: Instant::now(),
            timeline: Vec::new(),
            placed: HashMap::new(),
            timers: HashMap::new(),
            completions,
            closed: false,
        }))
    }
}

struct WavMicrophone {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    task: Option<JoinHandle<()>>,
    live: bool,
}

impl MicrophoneStream for WavMicrophone {
    fn start(&mut self, block_size: usize) -> Result<mpsc::Receiver<Vec<f32>>, DeviceError> {
        if !self.live {
            return Err(DeviceError::Closed);
        }
        if block_size == 0 || self.sample_rate == 0 {
            return Err(DeviceError::Unavailable(
                "capture block size and rate must be non-zero".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let samples = self.samples.clone();
        let period = Duration::from_secs_f64(block_size as f64 / f64::from(self.sample_rate));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            for chunk in samples.chunks(block_size) {
                ticker.tick().await;
                let mut block = chunk.to_vec();
                block.resize(block_size, 0.0);
                if tx.send(block).await.is_err() {
                    break;
                }
            }
            debug!("WAV microphone reached end of input");
        });

        if let Some(previous) = self.task.replace(handle) {
            previous.abort();
        }
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

struct WavInputContext {
    sample_rate: u32,
    closed: bool,
}

impl AudioContext for WavInputContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct WavOutput {
    sample_rate: u32,
    path: Option<PathBuf>,
    started: Instant,
    timeline: Vec<f32>,
    /// chunk id -> (first frame, frame count)
    placed: HashMap<ChunkId, (usize, usize)>,
    timers: HashMap<ChunkId, JoinHandle<()>>,
    completions: mpsc::UnboundedSender<ChunkId>,
    closed: bool,
}

impl WavOutput {
    fn frame_at(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * f64::from(self.sample_rate)).round() as usize
    }

    fn write_file(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.timeline {
            writer.write_sample(quantize(sample))?;
        }
        writer.finalize()
    }
}

impl AudioContext for WavOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        self.closed = true;

        if let Some(path) = &self.path {
            match self.write_file(path) {
                Ok(()) => info!(
                    path = %path.display(),
                    seconds = self.timeline.len() as f64 / f64::from(self.sample_rate),
                    "Wrote assistant audio"
                ),
                Err(e) => warn!(path = %path.display(), "Failed to write assistant audio: {}", e),
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl AudioOutput for WavOutput {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
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

        let samples = if buffer.sample_rate() == self.sample_rate {
            mono_mix(buffer)
        } else {
            resample(&mono_mix(buffer), buffer.sample_rate(), self.sample_rate)
        };

        let first = self.frame_at(start_at);
        let end = first + samples.len();
        if self.timeline.len() < end {
            self.timeline.resize(end, 0.0);
        }
        self.timeline[first..end].copy_from_slice(&samples);
        self.placed.insert(id, (first, samples.len()));

        self.timers.retain(|_, timer| !timer.is_finished());
        let delay = (start_at + buffer.duration() - self.current_time()).max(0.0);
        let completions = self.completions.clone();
        self.timers.insert(
            id,
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                let _ = completions.send(id);
            }),
        );
        Ok(())
    }

    fn stop(&mut self, id: ChunkId) {
        if let Some(timer) = self.timers.remove(&id) {
            timer.abort();
        }
        // Silence whatever part of the chunk had not been heard yet
        if let Some((first, len)) = self.placed.remove(&id) {
            let cut = self.frame_at(self.current_time()).max(first);
            let end = (first + len).min(self.timeline.len());
            if cut < end {
                self.timeline[cut..end].fill(0.0);
            }
        }
    }
}

fn mono_mix(buffer: &AudioBuffer) -> Vec<f32> {
    match buffer.channel_count() {
        0 => Vec::new(),
        1 => buffer.channel(0).map(<[f32]>::to_vec).unwrap_or_default(),
        count => buffer
            .interleaved()
            .chunks(count)
            .map(|frame| frame.iter().sum::<f32>() / count as f32)
            .collect(),
    }
}
