//! Voice assistant controller
//!
//! [`VoiceAssistant`] is a tick-driven state machine. The host calls
//! [`VoiceAssistant::tick`] periodically; each tick fires due timeouts, checks
//! the pipeline connection, then runs the action for the current state.
//! Remote pipeline events and local start/stop requests are applied between
//! ticks on the same task, so nothing here blocks or locks.

mod state;
mod timers;

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

pub use state::ControllerState;
pub use timers::{TimerAction, Timers};

use crate::events::{AssistantEvent, EventBus};
use crate::pipeline::{
    AudioSettings, PipelineControl, PipelineEvent, PipelineEventType, RequestFlags,
};
use crate::transport::Transport;
use crate::voice::{
    INPUT_BUFFER_SAMPLES, MediaPlayer, Microphone, PlaybackBuffer, RECEIVE_SIZE,
    RING_BUFFER_SAMPLES, RingBuffer, SAMPLE_RATE, SEND_BUFFER_SIZE, SPEAKER_BUFFER_SIZE, Speaker,
    VAD_FRAME_LENGTH_MS, VadCounter, VadDecision, VoiceActivityDetector,
};
use crate::{Error, Result};

/// Timeout that forgets the conversation id
pub const CONVERSATION_ID_TIMER: &str = "reset-conversation_id";

/// Timeout that stops the speaker after playback goes quiet
pub const SPEAKER_TIMEOUT_TIMER: &str = "speaker-timeout";

/// Timeout that ends the response once nothing is playing
pub const PLAYING_TIMER: &str = "playing";

const CONVERSATION_ID_EXPIRY: Duration = Duration::from_secs(5 * 60);
const SPEAKER_TIMEOUT: Duration = Duration::from_secs(2);
const PLAYING_TIMEOUT: Duration = Duration::from_secs(2);

/// Error codes the pipeline reports while waiting for a wake word that do
/// not end the turn
const SUPPRESSED_ERROR_CODES: [&str; 2] = ["wake-word-timeout", "wake_word_detection_aborted"];

/// Behavior settings for the controller
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    /// Gate runs on local VAD and ask the pipeline for wake word detection
    pub use_wake_word: bool,
    /// Net speech frames needed before a run is requested
    pub vad_threshold: u32,
    /// Audio hints sent with every start request
    pub audio_settings: AudioSettings,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            use_wake_word: false,
            vad_threshold: 3,
            audio_settings: AudioSettings::default(),
        }
    }
}

/// Voice assistant turn controller
pub struct VoiceAssistant {
    state: ControllerState,
    desired_state: ControllerState,

    continuous: bool,
    use_wake_word: bool,
    silence_detection: bool,
    wait_for_stream_end: bool,
    high_frequency: bool,

    conversation_id: String,
    audio_settings: AudioSettings,
    vad_counter: VadCounter,
    destination: Option<SocketAddr>,

    input_buffer: Vec<i16>,
    ring_buffer: RingBuffer<i16>,
    send_samples: Vec<i16>,
    send_buffer: Vec<u8>,
    playback: PlaybackBuffer,

    timers: Timers,
    now: Instant,

    microphone: Box<dyn Microphone>,
    speaker: Option<Box<dyn Speaker>>,
    media_player: Option<Box<dyn MediaPlayer>>,
    vad: Option<Box<dyn VoiceActivityDetector>>,
    transport: Box<dyn Transport>,
    control: Box<dyn PipelineControl>,
    events: EventBus,
}

impl VoiceAssistant {
    /// Create a controller and allocate its audio buffers
    ///
    /// # Errors
    ///
    /// Returns error if a buffer cannot be allocated
    pub fn new(
        config: AssistantConfig,
        microphone: Box<dyn Microphone>,
        transport: Box<dyn Transport>,
        control: Box<dyn PipelineControl>,
    ) -> Result<Self> {
        let input_buffer = zeroed(INPUT_BUFFER_SAMPLES, "input")?;
        let send_samples = zeroed(INPUT_BUFFER_SAMPLES, "send")?;
        let send_buffer = zeroed(SEND_BUFFER_SIZE, "send")?;
        let ring_buffer = RingBuffer::with_capacity(RING_BUFFER_SAMPLES)?;
        let playback = PlaybackBuffer::with_capacity(SPEAKER_BUFFER_SIZE)?;

        Ok(Self {
            state: ControllerState::Idle,
            desired_state: ControllerState::Idle,
            continuous: false,
            use_wake_word: config.use_wake_word,
            silence_detection: true,
            wait_for_stream_end: false,
            high_frequency: false,
            conversation_id: String::new(),
            audio_settings: config.audio_settings,
            vad_counter: VadCounter::new(config.vad_threshold),
            destination: None,
            input_buffer,
            ring_buffer,
            send_samples,
            send_buffer,
            playback,
            timers: Timers::new(),
            now: Instant::now(),
            microphone,
            speaker: None,
            media_player: None,
            vad: None,
            transport,
            control,
            events: EventBus::new(),
        })
    }

    /// Attach a local playback sink
    #[must_use]
    pub fn with_speaker(mut self, speaker: Box<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Attach a media player for URL responses
    #[must_use]
    pub fn with_media_player(mut self, media_player: Box<dyn MediaPlayer>) -> Self {
        self.media_player = Some(media_player);
        self
    }

    /// Set the VAD gate; `None` treats every captured frame as speech
    #[must_use]
    pub fn with_vad(mut self, vad: Option<Box<dyn VoiceActivityDetector>>) -> Self {
        self.vad = vad;
        self
    }

    /// Replace the event bus
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Event bus, for registering listeners
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub const fn desired_state(&self) -> ControllerState {
        self.desired_state
    }

    #[must_use]
    pub const fn is_continuous(&self) -> bool {
        self.continuous
    }

    #[must_use]
    pub const fn use_wake_word(&self) -> bool {
        self.use_wake_word
    }

    /// Switch wake word mode; applies from the next session
    pub fn set_use_wake_word(&mut self, use_wake_word: bool) {
        self.use_wake_word = use_wake_word;
    }

    #[must_use]
    pub const fn silence_detection(&self) -> bool {
        self.silence_detection
    }

    #[must_use]
    pub const fn wait_for_stream_end(&self) -> bool {
        self.wait_for_stream_end
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Where microphone audio is streamed, while a run is active
    #[must_use]
    pub const fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    /// Whether responses are played locally (speaker or media player)
    #[must_use]
    pub const fn local_output(&self) -> bool {
        self.speaker.is_some() || self.media_player.is_some()
    }

    /// Whether the host should tick at its elevated rate
    #[must_use]
    pub const fn wants_high_frequency(&self) -> bool {
        self.high_frequency
    }

    /// Current VAD hysteresis count
    #[must_use]
    pub const fn vad_count(&self) -> u32 {
        self.vad_counter.count()
    }

    /// Samples waiting to be streamed
    #[must_use]
    pub fn buffered_samples(&self) -> usize {
        self.ring_buffer.len()
    }

    #[must_use]
    pub const fn playback_buffer(&self) -> &PlaybackBuffer {
        &self.playback
    }

    #[must_use]
    pub const fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Transition unconditionally
    pub fn set_state(&mut self, state: ControllerState) {
        let old = self.state;
        self.state = state;
        tracing::debug!(from = %old, to = %state, "state changed");
    }

    /// Transition and record where the transitional state should lead
    pub fn set_state_and_desired(&mut self, state: ControllerState, desired: ControllerState) {
        self.set_state(state);
        self.desired_state = desired;
        tracing::debug!(desired = %desired, "desired state set");
    }

    /// Run one scheduler period
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Run one scheduler period against an explicit clock
    pub fn tick_at(&mut self, now: Instant) {
        self.now = now;

        for (name, action) in self.timers.take_due(now) {
            tracing::trace!(timer = name, "timeout fired");
            self.on_timer(action);
        }

        if self.watchdog() {
            return;
        }

        match self.state {
            ControllerState::Idle => {
                if self.continuous && self.desired_state == ControllerState::Idle {
                    self.begin_session();
                } else {
                    self.high_frequency = false;
                }
            }
            ControllerState::StartMicrophone => {
                tracing::debug!("starting microphone");
                self.send_buffer.fill(0);
                self.input_buffer.fill(0);
                self.microphone.start();
                self.high_frequency = true;
                self.set_state(ControllerState::StartingMicrophone);
            }
            ControllerState::StartingMicrophone => {
                if self.microphone.is_running() {
                    self.set_state(self.desired_state);
                }
            }
            ControllerState::WaitForVad => {
                self.read_microphone();
                self.vad_counter.reset();
                tracing::debug!("waiting for speech");
                self.set_state(ControllerState::WaitingForVad);
            }
            ControllerState::WaitingForVad => self.wait_for_speech(),
            ControllerState::StartPipeline => self.start_pipeline(),
            ControllerState::StartingPipeline => {
                // Keep draining until the pipeline reports its port
                self.read_microphone();
            }
            ControllerState::StreamingMicrophone => self.stream_microphone(),
            ControllerState::StopMicrophone => {
                if self.microphone.is_running() {
                    self.microphone.stop();
                    self.set_state(ControllerState::StoppingMicrophone);
                } else {
                    self.set_state(self.desired_state);
                }
            }
            ControllerState::StoppingMicrophone => {
                if self.microphone.is_stopped() {
                    self.set_state(self.desired_state);
                }
            }
            ControllerState::AwaitingResponse => {}
            ControllerState::StreamingResponse => self.stream_response(),
            ControllerState::ResponseFinished => {
                self.finish_response();
                self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
            }
        }
    }

    /// Begin a session
    ///
    /// Does nothing unless idle. Without a pipeline connection the controller
    /// is forced idle and continuous mode is cleared.
    pub fn request_start(&mut self, continuous: bool, silence_detection: bool) {
        if !self.control.is_connected() {
            tracing::error!("no pipeline connected");
            self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
            self.continuous = false;
            return;
        }

        if self.state == ControllerState::Idle {
            self.continuous = continuous;
            self.silence_detection = silence_detection;
            self.begin_session();
        }
    }

    /// End the session at the next safe point
    pub fn request_stop(&mut self) {
        self.continuous = false;

        match self.state {
            ControllerState::StartMicrophone
            | ControllerState::StartingMicrophone
            | ControllerState::WaitForVad
            | ControllerState::WaitingForVad
            | ControllerState::StartPipeline => {
                self.set_state_and_desired(ControllerState::StopMicrophone, ControllerState::Idle);
            }
            ControllerState::StartingPipeline | ControllerState::StreamingMicrophone => {
                self.signal_stop();
                self.set_state_and_desired(ControllerState::StopMicrophone, ControllerState::Idle);
            }
            ControllerState::StopMicrophone | ControllerState::StoppingMicrophone => {
                self.desired_state = ControllerState::Idle;
            }
            // A response in flight finishes on its own
            ControllerState::Idle
            | ControllerState::AwaitingResponse
            | ControllerState::StreamingResponse
            | ControllerState::ResponseFinished => {}
        }
    }

    /// The pipeline accepted a run and listens for audio at `address:port`
    pub fn start_streaming(&mut self, address: IpAddr, port: u16) {
        if self.state != ControllerState::StartingPipeline {
            tracing::debug!(state = %self.state, "unexpected stream start, stopping pipeline");
            self.signal_stop();
            return;
        }

        let destination = SocketAddr::new(address, port);
        tracing::debug!(%destination, "pipeline started, streaming microphone");
        self.destination = Some(destination);

        if self.microphone.is_running() {
            self.set_state_and_desired(
                ControllerState::StreamingMicrophone,
                ControllerState::StreamingMicrophone,
            );
        } else {
            self.set_state_and_desired(
                ControllerState::StartMicrophone,
                ControllerState::StreamingMicrophone,
            );
        }
    }

    /// The pipeline could not start a run
    pub fn failed_to_start(&mut self) {
        const MESSAGE: &str = "Failed to start server. See pipeline logs for more details.";

        tracing::error!("pipeline failed to start");
        self.fire(AssistantEvent::Error {
            code: "failed-to-start".to_string(),
            message: MESSAGE.to_string(),
        });
        self.set_state_and_desired(ControllerState::StopMicrophone, ControllerState::Idle);
    }

    /// Apply an event reported by the pipeline
    pub fn on_event(&mut self, event: &PipelineEvent) {
        tracing::debug!(event_type = ?event.event_type, "pipeline event");

        match event.event_type {
            PipelineEventType::RunStart => {
                tracing::debug!("pipeline running");
                self.fire(AssistantEvent::RunStart);
            }
            PipelineEventType::WakeWordStart => {}
            PipelineEventType::WakeWordEnd => {
                tracing::debug!("wake word detected");
                self.fire(AssistantEvent::WakeWordDetected);
            }
            PipelineEventType::SttStart => {
                tracing::debug!("speech-to-text started");
                self.fire(AssistantEvent::Listening);
            }
            PipelineEventType::SttEnd => {
                let Some(text) = non_empty_arg(event, "text") else {
                    tracing::warn!("no text in stt_end event");
                    return;
                };
                self.set_state_and_desired(
                    ControllerState::StopMicrophone,
                    ControllerState::AwaitingResponse,
                );
                tracing::debug!(text, "speech recognized");
                self.fire(AssistantEvent::SttEnd { text });
            }
            PipelineEventType::IntentEnd => {
                if let Some(id) = event.arg("conversation_id") {
                    self.conversation_id = id.to_string();
                }
            }
            PipelineEventType::TtsStart => {
                let Some(text) = non_empty_arg(event, "text") else {
                    tracing::warn!("no text in tts_start event");
                    return;
                };
                tracing::debug!(text, "response");
                self.fire(AssistantEvent::TtsStart { text });
                if let Some(speaker) = self.speaker.as_mut() {
                    speaker.start();
                }
            }
            PipelineEventType::TtsEnd => {
                let Some(url) = non_empty_arg(event, "url") else {
                    tracing::warn!("no url in tts_end event");
                    return;
                };
                tracing::debug!(url, "response url");
                if let Some(media_player) = self.media_player.as_mut() {
                    media_player.play_url(&url);
                }

                if self.local_output() {
                    self.set_state_and_desired(
                        ControllerState::StreamingResponse,
                        ControllerState::StreamingResponse,
                    );
                    self.arm_response_guards();
                } else {
                    self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
                }
                self.fire(AssistantEvent::TtsEnd { url });
            }
            PipelineEventType::RunEnd => {
                tracing::debug!("pipeline ended");
                if self.state == ControllerState::StreamingMicrophone {
                    if self.use_wake_word {
                        // Microphone keeps running for the next wake word
                        self.ring_buffer.reset();
                        self.set_state_and_desired(
                            ControllerState::WaitForVad,
                            ControllerState::WaitingForVad,
                        );
                    } else {
                        self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
                    }
                }
                self.fire(AssistantEvent::End);
            }
            PipelineEventType::Error => {
                let code = event.arg("code").unwrap_or_default().to_string();
                let message = event.arg("message").unwrap_or_default().to_string();

                if SUPPRESSED_ERROR_CODES.contains(&code.as_str()) {
                    tracing::debug!(code, "ignoring wake word error");
                    return;
                }

                tracing::error!(code, message, "pipeline error");
                if self.state != ControllerState::Idle {
                    if self.state.is_responding() {
                        self.finish_response();
                    }
                    self.signal_stop();
                    self.set_state_and_desired(
                        ControllerState::StopMicrophone,
                        ControllerState::Idle,
                    );
                }
                self.fire(AssistantEvent::Error { code, message });
            }
            PipelineEventType::TtsStreamStart => {
                self.wait_for_stream_end = true;
            }
            PipelineEventType::TtsStreamEnd => {
                self.set_state_and_desired(
                    ControllerState::ResponseFinished,
                    ControllerState::Idle,
                );
            }
            PipelineEventType::Unknown => {
                tracing::debug!("unhandled pipeline event");
            }
        }
    }

    /// Read one microphone frame into the input buffer and the ring buffer
    ///
    /// Returns the number of samples read; the input buffer is zeroed when
    /// nothing was read.
    pub fn read_microphone(&mut self) -> usize {
        if !self.microphone.is_running() {
            tracing::trace!("microphone not running");
            self.input_buffer.fill(0);
            return 0;
        }

        let read = self.microphone.read(&mut self.input_buffer);
        if read == 0 {
            self.input_buffer.fill(0);
            return 0;
        }

        self.ring_buffer.write(&self.input_buffer[..read]);
        read
    }

    fn begin_session(&mut self) {
        // Nothing from an earlier response may leak into this one
        self.wait_for_stream_end = false;
        self.playback.clear();

        if self.use_wake_word {
            self.ring_buffer.reset();
            self.set_state_and_desired(
                ControllerState::StartMicrophone,
                ControllerState::WaitForVad,
            );
        } else {
            self.set_state_and_desired(
                ControllerState::StartPipeline,
                ControllerState::StartMicrophone,
            );
        }
    }

    /// Force idle when the pipeline connection drops mid-session
    ///
    /// Returns true when it intervened and the state action must be skipped.
    fn watchdog(&mut self) -> bool {
        if self.state == ControllerState::Idle
            || self.state.is_stopping_microphone()
            || self.control.is_connected()
        {
            return false;
        }

        tracing::warn!(state = %self.state, "pipeline connection lost");
        if self.state.is_responding() {
            self.finish_response();
        }
        if self.microphone.is_running() || self.state == ControllerState::StartingMicrophone {
            self.set_state_and_desired(ControllerState::StopMicrophone, ControllerState::Idle);
        } else {
            self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
        }
        self.continuous = false;
        self.signal_stop();
        true
    }

    fn wait_for_speech(&mut self) {
        let read = self.read_microphone();
        if read == 0 {
            return;
        }

        let decision = match self.vad.as_mut() {
            Some(vad) => vad.classify(&self.input_buffer[..read], SAMPLE_RATE, VAD_FRAME_LENGTH_MS),
            None => VadDecision::Speech,
        };

        if self.vad_counter.update(decision) {
            tracing::debug!("VAD detected speech");
            self.set_state_and_desired(
                ControllerState::StartPipeline,
                ControllerState::StreamingMicrophone,
            );
        }
    }

    fn start_pipeline(&mut self) {
        self.read_microphone();
        tracing::debug!("requesting start");

        let mut flags = RequestFlags::empty();
        if self.use_wake_word {
            flags |= RequestFlags::USE_WAKE_WORD;
        }
        if self.silence_detection {
            flags |= RequestFlags::USE_VAD;
        }

        if !self
            .control
            .start_pipeline(&self.conversation_id, flags, &self.audio_settings)
        {
            tracing::warn!("could not request start");
            self.fire(AssistantEvent::Error {
                code: "not-connected".to_string(),
                message: "Could not request start.".to_string(),
            });
            self.continuous = false;
            self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
            return;
        }

        self.set_state(ControllerState::StartingPipeline);
        self.timers.set_timeout(
            CONVERSATION_ID_TIMER,
            self.now,
            CONVERSATION_ID_EXPIRY,
            TimerAction::ResetConversationId,
        );
    }

    fn stream_microphone(&mut self) {
        self.read_microphone();

        if self.ring_buffer.len() < self.send_samples.len() {
            return;
        }

        let read = self.ring_buffer.read(&mut self.send_samples);
        for (bytes, sample) in self
            .send_buffer
            .chunks_exact_mut(2)
            .zip(&self.send_samples[..read])
        {
            bytes.copy_from_slice(&sample.to_le_bytes());
        }

        let Some(destination) = self.destination else {
            tracing::trace!("no stream destination, dropping frame");
            return;
        };

        match self.transport.send_to(destination, &self.send_buffer) {
            Ok(sent) if sent < self.send_buffer.len() => {
                tracing::trace!(sent, "short audio send");
            }
            Ok(_) => {}
            Err(e) => tracing::trace!(error = %e, "audio send failed"),
        }
    }

    fn stream_response(&mut self) {
        if let Some(speaker) = self.speaker.as_mut() {
            if let Some(slot) = self.playback.write_slot(RECEIVE_SIZE) {
                match self.transport.receive(slot) {
                    Ok(0) => {}
                    Ok(received) => self.playback.commit(received),
                    Err(e) => tracing::trace!(error = %e, "audio receive failed"),
                }
            } else {
                tracing::trace!("receive buffer full");
            }

            if self.playback.size() > 0 {
                let written = speaker.play(self.playback.pending());
                if written > 0 {
                    self.playback.consume(written);
                    self.timers.set_timeout(
                        SPEAKER_TIMEOUT_TIMER,
                        self.now,
                        SPEAKER_TIMEOUT,
                        TimerAction::StopSpeaker,
                    );
                } else {
                    tracing::trace!("speaker buffer full");
                }
            }
        }

        if self.wait_for_stream_end {
            // The stream end event finishes the response
            self.timers.cancel_timeout(PLAYING_TIMER);
            return;
        }

        let mut playing = self.speaker.as_ref().is_some_and(|s| s.is_running());
        if let Some(media_player) = self.media_player.as_mut() {
            playing = media_player.is_playing();
        }

        if playing {
            self.timers.set_timeout(
                PLAYING_TIMER,
                self.now,
                PLAYING_TIMEOUT,
                TimerAction::PlaybackIdle,
            );
        }
    }

    /// Tear down response playback: stop the sink, drop buffered audio and
    /// clear the stream-end hold
    fn finish_response(&mut self) {
        if let Some(speaker) = self.speaker.as_mut() {
            speaker.stop();
        }
        self.timers.cancel_timeout(SPEAKER_TIMEOUT_TIMER);
        self.timers.cancel_timeout(PLAYING_TIMER);
        self.playback.clear();
        self.wait_for_stream_end = false;
    }

    /// Arm both playback timeouts on entering the response so a response
    /// that never produces audio still returns to idle
    fn arm_response_guards(&mut self) {
        let now = self.now;
        if self.speaker.is_some() {
            self.timers.set_timeout(
                SPEAKER_TIMEOUT_TIMER,
                now,
                SPEAKER_TIMEOUT,
                TimerAction::StopSpeaker,
            );
        }
        self.timers
            .set_timeout(PLAYING_TIMER, now, PLAYING_TIMEOUT, TimerAction::PlaybackIdle);
    }

    fn on_timer(&mut self, action: TimerAction) {
        match action {
            TimerAction::ResetConversationId => {
                tracing::debug!("conversation id expired");
                self.conversation_id.clear();
            }
            TimerAction::StopSpeaker => {
                if let Some(speaker) = self.speaker.as_mut() {
                    speaker.stop();
                }
            }
            TimerAction::PlaybackIdle => {
                if self.state == ControllerState::StreamingResponse && !self.wait_for_stream_end {
                    self.timers.cancel_timeout(SPEAKER_TIMEOUT_TIMER);
                    self.set_state_and_desired(ControllerState::Idle, ControllerState::Idle);
                }
            }
        }
    }

    fn signal_stop(&mut self) {
        tracing::debug!("signaling stop");
        self.control.stop_pipeline();
        self.destination = None;
    }

    fn fire(&mut self, event: AssistantEvent) {
        self.events.fire(&event);
    }
}

fn non_empty_arg(event: &PipelineEvent, name: &str) -> Option<String> {
    event
        .arg(name)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn zeroed<T: Clone + Default>(len: usize, what: &str) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| Error::Setup(format!("could not allocate {what} buffer: {e}")))?;
    buffer.resize(len, T::default());
    Ok(buffer)
}
