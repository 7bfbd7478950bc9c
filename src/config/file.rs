//! TOML configuration file loading
//!
//! Supports `~/.config/voice-satellite/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::VadBackend;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SatelliteConfigFile {
    /// Device name advertised to the network
    #[serde(default)]
    pub name: Option<String>,

    /// Control server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Audio device and transport configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Assistant behavior
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Tick cadence
    #[serde(default)]
    pub scheduler: SchedulerFileConfig,

    /// mDNS advertisement
    #[serde(default)]
    pub discovery: DiscoveryFileConfig,
}

/// Control server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Local UDP port for streamed audio
    pub udp_port: Option<u16>,

    /// Play responses on the local output device
    pub speaker: Option<bool>,

    /// Command used to play response URLs (e.g. "mpv --no-video")
    pub media_player_command: Option<String>,
}

/// Assistant behavior configuration
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    pub use_wake_word: Option<bool>,
    pub vad_threshold: Option<u32>,
    pub vad_backend: Option<VadBackend>,
    /// earshot profile, 0 (quality) to 3 (very aggressive)
    pub vad_aggressiveness: Option<u8>,
    pub rms_threshold: Option<u32>,
    pub noise_suppression_level: Option<u32>,
    pub auto_gain: Option<u32>,
    pub volume_multiplier: Option<f32>,
}

/// Scheduler configuration
#[derive(Debug, Default, Deserialize)]
pub struct SchedulerFileConfig {
    pub tick_ms: Option<u64>,
    pub high_frequency_tick_ms: Option<u64>,
}

/// Discovery configuration
#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryFileConfig {
    pub enabled: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SatelliteConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SatelliteConfigFile {
    let Some(path) = config_file_path() else {
        return SatelliteConfigFile::default();
    };

    if !path.exists() {
        return SatelliteConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            SatelliteConfigFile::default()
        }
    }
}

/// Read and parse a config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<SatelliteConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/voice-satellite/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-satellite").join("config.toml"))
}

/// Reject values the daemon cannot run with
///
/// # Errors
///
/// Returns error naming the first invalid field
pub fn validate(file: &SatelliteConfigFile) -> Result<()> {
    if file.scheduler.tick_ms == Some(0) || file.scheduler.high_frequency_tick_ms == Some(0) {
        return Err(Error::Config("scheduler tick periods must be non-zero".to_string()));
    }
    if file.assistant.volume_multiplier.is_some_and(|v| !v.is_finite() || v < 0.0) {
        return Err(Error::Config(
            "assistant.volume_multiplier must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}
