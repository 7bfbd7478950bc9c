//! Configuration management for the voice satellite
//!
//! Values are layered env > toml > default.

pub mod file;

use serde::Serialize;

use crate::assistant::AssistantConfig;
use crate::pipeline::AudioSettings;
use crate::voice::{DEFAULT_RMS_THRESHOLD, VadBackend};
use crate::{Error, Result};

use file::SatelliteConfigFile;

/// Voice satellite configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Device name advertised to the network
    /// Set via `SATELLITE_NAME` env var
    pub name: String,

    /// Control server configuration
    pub server: ServerConfig,

    /// Audio device and transport configuration
    pub audio: AudioConfig,

    /// Assistant behavior
    pub assistant: AssistantSettings,

    /// Tick cadence
    pub scheduler: SchedulerConfig,

    /// mDNS advertisement
    pub discovery: DiscoveryConfig,
}

/// Control server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    /// HTTP/WebSocket port
    /// Set via `SATELLITE_PORT` env var
    pub port: u16,
}

/// Audio configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioConfig {
    /// Local UDP port for streamed audio
    /// Set via `SATELLITE_UDP_PORT` env var
    pub udp_port: u16,

    /// Play responses on the local output device
    pub speaker: bool,

    /// Command used to play response URLs
    pub media_player_command: Option<String>,
}

/// Assistant behavior configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantSettings {
    /// Gate on local VAD and ask the pipeline for wake word detection
    /// Set via `SATELLITE_WAKE_WORD` env var
    pub use_wake_word: bool,

    /// Net speech frames needed before a run is requested
    pub vad_threshold: u32,

    pub vad_backend: VadBackend,

    /// earshot profile, 0 (quality) to 3 (very aggressive)
    pub vad_aggressiveness: u8,

    /// RMS level treated as speech by the RMS backend
    pub rms_threshold: u32,

    pub noise_suppression_level: u32,
    pub auto_gain: u32,
    pub volume_multiplier: f32,
}

impl AssistantSettings {
    /// Controller settings derived from this configuration
    #[must_use]
    pub const fn assistant_config(&self) -> AssistantConfig {
        AssistantConfig {
            use_wake_word: self.use_wake_word,
            vad_threshold: self.vad_threshold,
            audio_settings: AudioSettings {
                noise_suppression_level: self.noise_suppression_level,
                auto_gain: self.auto_gain,
                volume_multiplier: self.volume_multiplier,
            },
        }
    }
}

/// Tick cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerConfig {
    /// Period while idle or waiting on the network
    pub tick_ms: u64,

    /// Period while the microphone is live
    pub high_frequency_tick_ms: u64,
}

/// mDNS advertisement configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryConfig {
    pub enabled: bool,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Layer `env` over `fc` over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn from_sources(
        fc: SatelliteConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        file::validate(&fc)?;

        let name = env("SATELLITE_NAME")
            .filter(|s| !s.trim().is_empty())
            .or(fc.name)
            .unwrap_or_else(default_name);

        // Server config (env > toml > default)
        let server = ServerConfig {
            port: env("SATELLITE_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(6053),
        };

        // Audio config (env > toml > default)
        let audio = AudioConfig {
            udp_port: env("SATELLITE_UDP_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.audio.udp_port)
                .unwrap_or(6055),
            speaker: fc.audio.speaker.unwrap_or(true),
            media_player_command: fc
                .audio
                .media_player_command
                .filter(|c| !c.trim().is_empty()),
        };

        let vad_backend = match env("SATELLITE_VAD_BACKEND") {
            Some(value) => value.parse()?,
            None => fc.assistant.vad_backend.unwrap_or_default(),
        };

        // Assistant config (env > toml > default)
        let assistant = AssistantSettings {
            use_wake_word: env("SATELLITE_WAKE_WORD")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.assistant.use_wake_word)
                .unwrap_or(false),
            vad_threshold: fc.assistant.vad_threshold.unwrap_or(3),
            vad_backend,
            vad_aggressiveness: fc.assistant.vad_aggressiveness.unwrap_or(3),
            rms_threshold: fc.assistant.rms_threshold.unwrap_or(DEFAULT_RMS_THRESHOLD),
            noise_suppression_level: fc.assistant.noise_suppression_level.unwrap_or(0),
            auto_gain: fc.assistant.auto_gain.unwrap_or(0),
            volume_multiplier: fc.assistant.volume_multiplier.unwrap_or(1.0),
        };

        let scheduler = SchedulerConfig {
            tick_ms: fc.scheduler.tick_ms.unwrap_or(16),
            high_frequency_tick_ms: fc.scheduler.high_frequency_tick_ms.unwrap_or(4),
        };

        let discovery = DiscoveryConfig {
            enabled: fc.discovery.enabled.unwrap_or(true),
        };

        Ok(Self {
            name,
            server,
            audio,
            assistant,
            scheduler,
            discovery,
        })
    }

    /// Render as TOML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

fn default_name() -> String {
    hostname::get().map_or_else(
        |_| "voice-satellite".to_string(),
        |h| h.to_string_lossy().to_string(),
    )
}
