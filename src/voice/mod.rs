//! Voice I/O module
//!
//! Capability traits for the microphone, speaker, VAD gate and media player,
//! their `cpal`/`earshot` backed implementations, and the fixed-size buffers
//! the assistant controller streams audio through.

mod capture;
mod media;
mod playback;
mod ring_buffer;
mod speaker_buffer;
mod vad;

pub use capture::{CpalMicrophone, Microphone, samples_to_wav};
pub use media::{CommandMediaPlayer, MediaPlayer};
pub use playback::{CpalSpeaker, Speaker};
pub use ring_buffer::RingBuffer;
pub use speaker_buffer::PlaybackBuffer;
pub use vad::{
    DEFAULT_RMS_THRESHOLD, EarshotVad, RmsVad, VadBackend, VadCounter, VadDecision,
    VoiceActivityDetector, create_vad, rms,
};

/// Sample rate for capture and playback (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples in one microphone read (32ms at 16kHz)
pub const INPUT_BUFFER_SAMPLES: usize = 32 * SAMPLE_RATE as usize / 1000;

/// Samples held by the capture ring buffer (1s)
pub const RING_BUFFER_SAMPLES: usize = SAMPLE_RATE as usize;

/// Bytes in one outbound datagram (one microphone read of 16-bit PCM)
pub const SEND_BUFFER_SIZE: usize = INPUT_BUFFER_SAMPLES * std::mem::size_of::<i16>();

/// Bytes requested from the transport per receive
pub const RECEIVE_SIZE: usize = 1024;

/// Bytes held by the playback buffer
pub const SPEAKER_BUFFER_SIZE: usize = 16 * RECEIVE_SIZE;

/// Frame length handed to the VAD gate
pub const VAD_FRAME_LENGTH_MS: u32 = 30;

/// Convert a float sample in `[-1.0, 1.0]` to 16-bit PCM
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * f32::from(i16::MAX)).round() as i16
    } else {
        (clamped * 32_768.0).round() as i16
    }
}

/// Convert a 16-bit PCM sample to a float in `[-1.0, 1.0)`
#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}
