//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::{RING_BUFFER_SAMPLES, SAMPLE_RATE, f32_to_i16};
use crate::{Error, Result};

/// Microphone capability consumed by the assistant controller
///
/// All methods are non-blocking. `read` may return 0 when no audio is ready.
pub trait Microphone {
    /// Begin capturing; readiness is reported later through `is_running`
    fn start(&mut self);

    /// Stop capturing; completion is reported through `is_stopped`
    fn stop(&mut self);

    /// Whether captured audio can be read
    fn is_running(&self) -> bool;

    /// Whether the device has fully stopped
    fn is_stopped(&self) -> bool;

    /// Read up to `buf.len()` samples, returning the number of samples read
    fn read(&mut self, buf: &mut [i16]) -> usize;
}

/// Captures 16-bit mono audio from the default input device
pub struct CpalMicrophone {
    config: StreamConfig,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    stream: Option<Stream>,
}

impl CpalMicrophone {
    /// Create a new microphone instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "microphone initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(RING_BUFFER_SAMPLES))),
            stream: None,
        })
    }

    fn open_stream(&self) -> Result<Stream> {
        let buffer = Arc::clone(&self.buffer);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        // Keep at most one second; the controller drains every tick
                        let overflow = (buf.len() + data.len()).saturating_sub(RING_BUFFER_SAMPLES);
                        let len = buf.len();
                        buf.drain(..overflow.min(len));
                        buf.extend(data.iter().copied().map(f32_to_i16));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        Ok(stream)
    }

    /// Number of samples captured but not yet read
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or_default()
    }
}

impl Microphone for CpalMicrophone {
    fn start(&mut self) {
        if self.stream.is_some() {
            return;
        }

        match self.open_stream() {
            Ok(stream) => {
                self.stream = Some(stream);
                tracing::debug!("audio capture started");
            }
            Err(e) => tracing::error!(error = %e, "failed to start microphone"),
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }
            tracing::debug!("audio capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn is_stopped(&self) -> bool {
        self.stream.is_none()
    }

    fn read(&mut self, out: &mut [i16]) -> usize {
        let Ok(mut buf) = self.buffer.lock() else {
            return 0;
        };

        let count = out.len().min(buf.len());
        for (slot, sample) in out.iter_mut().zip(buf.drain(..count)) {
            *slot = sample;
        }
        count
    }
}

/// Encode 16-bit mono samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
