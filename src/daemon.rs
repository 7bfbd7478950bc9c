//! Daemon - the satellite service
//!
//! Builds the audio devices, transport and control server, then drives the
//! assistant: one task owns the controller and interleaves scheduler ticks
//! with commands from the server tasks.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

use crate::api::{ApiServer, ApiState, ControlCommand, ControlHandle};
use crate::assistant::{ControllerState, VoiceAssistant};
use crate::config::SchedulerConfig;
use crate::discovery::{MdnsAdvertiser, ServiceAdvert};
use crate::events::EventBus;
use crate::transport::UdpTransport;
use crate::voice::{CommandMediaPlayer, CpalMicrophone, CpalSpeaker, create_vad};
use crate::{Config, Result};

/// Capacity of the server to daemon command queue
const COMMAND_QUEUE: usize = 32;

/// Capacity of the event feed for observers
const EVENT_FEED: usize = 64;

/// Longest wait for the microphone to close on shutdown
const STOP_GRACE: Duration = Duration::from_millis(500);

/// Longest wait for the peer socket to take the final stop message
const FLUSH_GRACE: Duration = Duration::from_millis(250);

/// The satellite daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Set up every component and run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if a setup step fails (port bind, audio device, buffer
    /// allocation); nothing is ticked in that case
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        tracing::info!(
            name = %config.name,
            port = config.server.port,
            udp_port = config.audio.udp_port,
            "daemon starting"
        );

        let transport = UdpTransport::bind(config.audio.udp_port).await?;
        let microphone = CpalMicrophone::new()?;

        let control = ControlHandle::new();
        let (events_tx, _) = broadcast::channel(EVENT_FEED);
        let mut events = EventBus::with_logging();
        events.forward_to(events_tx.clone());

        let vad = if config.assistant.use_wake_word {
            create_vad(
                config.assistant.vad_backend,
                config.assistant.vad_aggressiveness,
                config.assistant.rms_threshold,
            )
        } else {
            None
        };

        let mut assistant = VoiceAssistant::new(
            config.assistant.assistant_config(),
            Box::new(microphone),
            Box::new(transport),
            Box::new(control.clone()),
        )?
        .with_vad(vad)
        .with_events(events);

        if config.audio.speaker {
            match CpalSpeaker::new() {
                Ok(speaker) => assistant = assistant.with_speaker(Box::new(speaker)),
                Err(e) => tracing::warn!(error = %e, "no speaker, responses will not play locally"),
            }
        }

        if let Some(command) = config.audio.media_player_command.as_deref() {
            let player = CommandMediaPlayer::new(command)?;
            assistant = assistant.with_media_player(Box::new(player));
        }

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (status_tx, status_rx) = watch::channel(assistant.state());

        let mut server = ApiServer::new(
            ApiState {
                name: config.name.clone(),
                commands: commands_tx,
                control: control.clone(),
                status: status_rx,
                events: events_tx,
            },
            config.server.port,
        )
        .bind()
        .await?
        .spawn();

        // Keep the advertiser alive for the lifetime of the loop
        let _advertiser = if config.discovery.enabled {
            advertise(&config, assistant.local_output())
        } else {
            None
        };

        tracing::info!(
            wake_word = config.assistant.use_wake_word,
            local_output = assistant.local_output(),
            "voice assistant ready"
        );

        let shutdown = async {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_err() {
                        tracing::warn!("could not listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                    tracing::info!("shutdown requested");
                }
                result = &mut server => match result {
                    Ok(Ok(())) => tracing::error!("control server exited"),
                    Ok(Err(e)) => tracing::error!(error = %e, "control server failed"),
                    Err(e) => tracing::error!(error = %e, "control server task failed"),
                },
            }
        };

        drive(
            &mut assistant,
            commands_rx,
            &status_tx,
            &config.scheduler,
            shutdown,
        )
        .await;

        // Let the socket task write the final stop before it is torn down
        let deadline = tokio::time::Instant::now() + FLUSH_GRACE;
        while !control.is_drained() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        server.abort();
        Ok(())
    }
}

fn advertise(config: &Config, speaker: bool) -> Option<MdnsAdvertiser> {
    let advert = ServiceAdvert {
        name: config.name.clone(),
        port: config.server.port,
        wake_word: config.assistant.use_wake_word,
        speaker,
    };

    let result = MdnsAdvertiser::new().and_then(|mut advertiser| {
        advertiser.start(&advert)?;
        Ok(advertiser)
    });

    match result {
        Ok(advertiser) => Some(advertiser),
        Err(e) => {
            tracing::warn!(error = %e, "mDNS advertisement unavailable");
            None
        }
    }
}

/// Tick the assistant and apply commands until `shutdown` completes, then
/// stop the session
///
/// The tick period follows the assistant's cadence request. The current
/// state is published to `status` after every step.
pub async fn drive(
    assistant: &mut VoiceAssistant,
    mut commands: mpsc::Receiver<ControlCommand>,
    status: &watch::Sender<ControllerState>,
    scheduler: &SchedulerConfig,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    let mut high_frequency = assistant.wants_high_frequency();
    let mut ticker = new_ticker(scheduler, high_frequency);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break,
            Some(command) = commands.recv() => apply_command(assistant, command),
            _ = ticker.tick() => assistant.tick(),
        }

        publish(status, assistant);

        if assistant.wants_high_frequency() != high_frequency {
            high_frequency = assistant.wants_high_frequency();
            tracing::trace!(high_frequency, "tick cadence changed");
            ticker = new_ticker(scheduler, high_frequency);
        }
    }

    wind_down(assistant, status, scheduler).await;
}

/// Stop the session and tick until the microphone has closed
async fn wind_down(
    assistant: &mut VoiceAssistant,
    status: &watch::Sender<ControllerState>,
    scheduler: &SchedulerConfig,
) {
    assistant.request_stop();

    let deadline = tokio::time::Instant::now() + STOP_GRACE;
    let mut ticker = new_ticker(scheduler, true);
    while assistant.state().is_stopping_microphone() {
        if tokio::time::timeout_at(deadline, ticker.tick()).await.is_err() {
            tracing::warn!(state = %assistant.state(), "microphone still open at shutdown");
            break;
        }
        assistant.tick();
    }

    publish(status, assistant);
}

fn publish(status: &watch::Sender<ControllerState>, assistant: &VoiceAssistant) {
    status.send_if_modified(|state| {
        let changed = *state != assistant.state();
        *state = assistant.state();
        changed
    });
}

/// Apply one server command to the assistant
pub fn apply_command(assistant: &mut VoiceAssistant, command: ControlCommand) {
    match command {
        ControlCommand::Start {
            continuous,
            silence_detection,
        } => assistant.request_start(continuous, silence_detection),
        ControlCommand::Stop => assistant.request_stop(),
        ControlCommand::Event(event) => assistant.on_event(&event),
        ControlCommand::StreamStarted { address, port } => assistant.start_streaming(address, port),
        ControlCommand::FailedToStart => assistant.failed_to_start(),
    }
}

fn new_ticker(scheduler: &SchedulerConfig, high_frequency: bool) -> Interval {
    let period_ms = if high_frequency {
        scheduler.high_frequency_tick_ms
    } else {
        scheduler.tick_ms
    };

    let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
