//! Audio playback to speakers

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::{SAMPLE_RATE, i16_to_f32};
use crate::{Error, Result};

/// Samples the output queue holds (0.5s at 16kHz)
const QUEUE_SAMPLES: usize = SAMPLE_RATE as usize / 2;

/// Playback sink capability consumed by the assistant controller
pub trait Speaker {
    /// Open the output device
    fn start(&mut self);

    /// Close the output device and drop anything queued
    fn stop(&mut self);

    /// Whether the output device is open
    fn is_running(&self) -> bool;

    /// Queue 16-bit little-endian PCM bytes without blocking, starting the
    /// sink if needed
    ///
    /// Returns the number of bytes accepted; 0 means the sink is full.
    fn play(&mut self, data: &[u8]) -> usize;
}

/// Plays 16-bit mono PCM to the default output device
pub struct CpalSpeaker {
    config: StreamConfig,
    queue: Arc<Mutex<VecDeque<i16>>>,
    stream: Option<Stream>,
}

impl CpalSpeaker {
    /// Create a new speaker instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "speaker initialized"
        );

        Ok(Self {
            config,
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(QUEUE_SAMPLES))),
            stream: None,
        })
    }

    fn open_stream(&self) -> Result<Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = self.config.channels as usize;
        let queue = Arc::clone(&self.queue);

        let stream = device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = queue.lock() else {
                        data.fill(0.0);
                        return;
                    };

                    for frame in data.chunks_mut(channels) {
                        let sample = queue.pop_front().map_or(0.0, i16_to_f32);
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        Ok(stream)
    }

    /// Number of samples queued but not yet rendered
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or_default()
    }
}

impl Speaker for CpalSpeaker {
    fn start(&mut self) {
        if self.stream.is_some() {
            return;
        }

        match self.open_stream() {
            Ok(stream) => {
                self.stream = Some(stream);
                tracing::debug!("audio playback started");
            }
            Err(e) => tracing::error!(error = %e, "failed to start speaker"),
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio playback stopped");
        }
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn play(&mut self, data: &[u8]) -> usize {
        // Audio arriving after a timeout stop reopens the device
        if self.stream.is_none() {
            self.start();
        }

        let Ok(mut queue) = self.queue.lock() else {
            return 0;
        };

        // Whole samples only; an odd trailing byte waits for the next call
        let free = QUEUE_SAMPLES.saturating_sub(queue.len());
        let samples = (data.len() / 2).min(free);
        queue.extend(
            data[..samples * 2]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        samples * 2
    }
}
