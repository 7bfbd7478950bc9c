//! External media player for URL-based TTS responses

use std::process::{Child, Command, Stdio};

use crate::{Error, Result};

/// Media player capability consumed by the assistant controller
pub trait MediaPlayer {
    /// Begin playing the media at `url`, replacing anything already playing
    fn play_url(&mut self, url: &str);

    /// Whether media is still playing
    fn is_playing(&mut self) -> bool;
}

/// Plays URLs by spawning a configured command (e.g. `mpv --no-video`)
///
/// The URL is appended as the last argument. Playback is considered active
/// while the child process is alive.
pub struct CommandMediaPlayer {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandMediaPlayer {
    /// Parse a whitespace-separated command line
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("media player command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            child: None,
        })
    }

    fn stop_current(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "media player already exited");
            }
            let _ = child.wait();
        }
    }
}

impl MediaPlayer for CommandMediaPlayer {
    fn play_url(&mut self, url: &str) {
        self.stop_current();

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(child) => {
                tracing::debug!(program = %self.program, url, "media playback started");
                self.child = Some(child);
            }
            Err(e) => {
                tracing::error!(
                    program = %self.program,
                    error = %e,
                    "failed to spawn media player"
                );
            }
        }
    }

    fn is_playing(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(%status, "media playback finished");
                self.child = None;
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll media player");
                self.child = None;
                false
            }
        }
    }
}

impl Drop for CommandMediaPlayer {
    fn drop(&mut self) {
        self.stop_current();
    }
}
