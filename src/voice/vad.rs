//! Voice activity detection
//!
//! Gates pipeline start on local speech detection. Two backends are
//! provided: an `earshot` adapter and an RMS threshold fallback. The
//! [`VadCounter`] adds hysteresis on top of whichever backend classifies
//! the frames.

use std::str::FromStr;

use earshot::{VoiceActivityDetector as EarshotDetector, VoiceActivityProfile};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Default RMS level (16-bit PCM) at or above which a frame is speech
pub const DEFAULT_RMS_THRESHOLD: u32 = 2000;

/// Classification of one audio frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Frame contains speech
    Speech,
    /// Frame is silence or noise
    Silence,
}

/// VAD gate capability consumed by the assistant controller
pub trait VoiceActivityDetector {
    /// Classify one frame of 16-bit PCM
    fn classify(&mut self, samples: &[i16], sample_rate: u32, frame_ms: u32) -> VadDecision;

    /// Backend identifier for logs
    fn name(&self) -> &'static str;
}

/// Which VAD gate to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadBackend {
    /// `earshot` detector
    #[default]
    Earshot,
    /// RMS threshold fallback
    Rms,
    /// No local gate; every non-empty frame counts as speech
    None,
}

impl FromStr for VadBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earshot" => Ok(Self::Earshot),
            "rms" | "energy" => Ok(Self::Rms),
            "none" | "off" => Ok(Self::None),
            other => Err(Error::Config(format!("unknown VAD backend: {other}"))),
        }
    }
}

/// Build the configured VAD gate, or `None` when gating is disabled
#[must_use]
pub fn create_vad(
    backend: VadBackend,
    aggressiveness: u8,
    rms_threshold: u32,
) -> Option<Box<dyn VoiceActivityDetector>> {
    let vad: Option<Box<dyn VoiceActivityDetector>> = match backend {
        VadBackend::Earshot => Some(Box::new(EarshotVad::new(aggressiveness))),
        VadBackend::Rms => Some(Box::new(RmsVad::new(rms_threshold))),
        VadBackend::None => None,
    };

    tracing::debug!(
        backend = vad.as_ref().map_or("none", |v| v.name()),
        "VAD gate initialized"
    );
    vad
}

/// Adapter over the `earshot` detector
pub struct EarshotVad {
    detector: EarshotDetector,
    scratch: Vec<i16>,
}

impl EarshotVad {
    /// Create a detector; `aggressiveness` 0 (quality) to 3 (very aggressive)
    #[must_use]
    pub fn new(aggressiveness: u8) -> Self {
        let profile = match aggressiveness {
            0 => VoiceActivityProfile::QUALITY,
            1 => VoiceActivityProfile::LBR,
            2 => VoiceActivityProfile::AGGRESSIVE,
            _ => VoiceActivityProfile::VERY_AGGRESSIVE,
        };

        Self {
            detector: EarshotDetector::new(profile),
            // 30ms at 16kHz, the longest frame the detector accepts
            scratch: Vec::with_capacity(480),
        }
    }
}

impl VoiceActivityDetector for EarshotVad {
    fn classify(&mut self, samples: &[i16], sample_rate: u32, frame_ms: u32) -> VadDecision {
        if sample_rate != 16000 {
            tracing::trace!(sample_rate, "earshot only classifies 16kHz audio");
            return VadDecision::Silence;
        }

        // Detector accepts 10, 20 or 30ms frames
        let frame_ms = (frame_ms.clamp(10, 30) / 10) * 10;
        let frame_samples = (sample_rate * frame_ms / 1000) as usize;

        self.scratch.clear();
        self.scratch
            .extend_from_slice(&samples[..frame_samples.min(samples.len())]);
        self.scratch.resize(frame_samples, 0);

        match self.detector.predict_16khz(&self.scratch) {
            Ok(true) => VadDecision::Speech,
            Ok(false) => VadDecision::Silence,
            Err(e) => {
                tracing::trace!(error = ?e, "earshot rejected frame");
                VadDecision::Silence
            }
        }
    }

    fn name(&self) -> &'static str {
        "earshot"
    }
}

/// RMS threshold detector
pub struct RmsVad {
    threshold: u32,
}

impl RmsVad {
    /// Create a detector firing when frame RMS is at or above `threshold`
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

impl VoiceActivityDetector for RmsVad {
    fn classify(&mut self, samples: &[i16], _sample_rate: u32, _frame_ms: u32) -> VadDecision {
        if rms(samples) >= self.threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn name(&self) -> &'static str {
        "rms"
    }
}

/// Integer RMS of 16-bit samples
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn rms(samples: &[i16]) -> u32 {
    if samples.is_empty() {
        return 0;
    }

    let sum_squares: u64 = samples
        .iter()
        .map(|&s| {
            let s = i64::from(s);
            (s * s).unsigned_abs()
        })
        .sum();
    ((sum_squares / samples.len() as u64) as f64).sqrt() as u32
}

/// Hysteresis over per-frame VAD decisions
///
/// Counts up on speech and down on silence, within `[0, threshold]`.
/// Reaching the threshold reports a trigger and rewinds to 0.
#[derive(Debug, Clone)]
pub struct VadCounter {
    count: u32,
    threshold: u32,
}

impl VadCounter {
    /// Create a counter that triggers after `threshold` net speech frames
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Feed one decision; returns true when speech is confirmed
    pub fn update(&mut self, decision: VadDecision) -> bool {
        match decision {
            VadDecision::Speech => {
                self.count = (self.count + 1).min(self.threshold);
                if self.count >= self.threshold {
                    self.count = 0;
                    return true;
                }
            }
            VadDecision::Silence => {
                self.count = self.count.saturating_sub(1);
            }
        }
        false
    }

    /// Current count
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Configured threshold
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Rewind to 0
    pub const fn reset(&mut self) {
        self.count = 0;
    }
}
