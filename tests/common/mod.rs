//! Shared test utilities
//!
//! Scriptable stand-ins for the assistant's collaborators. Each mock shares
//! an `Rc<RefCell<…>>` probe with the test so calls can be inspected and
//! behavior changed between ticks.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use voice_satellite::voice::{MediaPlayer, Microphone, Speaker, VadDecision, VoiceActivityDetector};
use voice_satellite::{
    AssistantConfig, AssistantEvent, AudioSettings, PipelineControl, RequestFlags, Transport,
    VoiceAssistant,
};

/// Scheduler period used by [`Harness::tick`]
pub const TICK: Duration = Duration::from_millis(16);

/// Microphone state visible to tests
#[derive(Debug)]
pub struct MicProbe {
    pub running: bool,
    pub stopped: bool,
    /// Whether `start` makes the device ready immediately
    pub ready_on_start: bool,
    pub starts: usize,
    pub stops: usize,
    /// Frames returned by `read`, in order
    pub frames: VecDeque<Vec<i16>>,
    /// Value of an endless signal once `frames` is empty
    pub fill: Option<i16>,
}

impl Default for MicProbe {
    fn default() -> Self {
        Self {
            running: false,
            stopped: true,
            ready_on_start: true,
            starts: 0,
            stops: 0,
            frames: VecDeque::new(),
            fill: Some(1000),
        }
    }
}

pub struct MockMicrophone(pub Rc<RefCell<MicProbe>>);

impl Microphone for MockMicrophone {
    fn start(&mut self) {
        let mut probe = self.0.borrow_mut();
        probe.starts += 1;
        if probe.ready_on_start {
            probe.running = true;
            probe.stopped = false;
        }
    }

    fn stop(&mut self) {
        let mut probe = self.0.borrow_mut();
        probe.stops += 1;
        probe.running = false;
        probe.stopped = true;
    }

    fn is_running(&self) -> bool {
        self.0.borrow().running
    }

    fn is_stopped(&self) -> bool {
        self.0.borrow().stopped
    }

    fn read(&mut self, buf: &mut [i16]) -> usize {
        let mut probe = self.0.borrow_mut();
        if let Some(frame) = probe.frames.pop_front() {
            let count = frame.len().min(buf.len());
            buf[..count].copy_from_slice(&frame[..count]);
            return count;
        }
        match probe.fill {
            Some(value) => {
                buf.fill(value);
                buf.len()
            }
            None => 0,
        }
    }
}

/// Speaker state visible to tests
#[derive(Debug)]
pub struct SpeakerProbe {
    pub running: bool,
    pub starts: usize,
    pub stops: usize,
    /// Most bytes accepted by one `play` call
    pub accept: usize,
    pub played: Vec<u8>,
}

impl Default for SpeakerProbe {
    fn default() -> Self {
        Self {
            running: false,
            starts: 0,
            stops: 0,
            accept: usize::MAX,
            played: Vec::new(),
        }
    }
}

pub struct MockSpeaker(pub Rc<RefCell<SpeakerProbe>>);

impl Speaker for MockSpeaker {
    fn start(&mut self) {
        let mut probe = self.0.borrow_mut();
        probe.starts += 1;
        probe.running = true;
    }

    fn stop(&mut self) {
        let mut probe = self.0.borrow_mut();
        probe.stops += 1;
        probe.running = false;
    }

    fn is_running(&self) -> bool {
        self.0.borrow().running
    }

    fn play(&mut self, data: &[u8]) -> usize {
        let mut probe = self.0.borrow_mut();
        probe.running = true;
        let count = data.len().min(probe.accept);
        probe.played.extend_from_slice(&data[..count]);
        count
    }
}

/// Transport state visible to tests
#[derive(Debug, Default)]
pub struct TransportProbe {
    pub sent: Vec<(SocketAddr, Vec<u8>)>,
    /// Datagrams handed out by `receive`, in order
    pub incoming: VecDeque<Vec<u8>>,
    pub receives: usize,
    pub fail_sends: bool,
}

pub struct MockTransport(pub Rc<RefCell<TransportProbe>>);

impl Transport for MockTransport {
    fn send_to(&mut self, addr: SocketAddr, data: &[u8]) -> voice_satellite::Result<usize> {
        let mut probe = self.0.borrow_mut();
        if probe.fail_sends {
            return Err(voice_satellite::Error::Transport("unreachable".to_string()));
        }
        probe.sent.push((addr, data.to_vec()));
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> voice_satellite::Result<usize> {
        let mut probe = self.0.borrow_mut();
        probe.receives += 1;
        let Some(datagram) = probe.incoming.pop_front() else {
            return Ok(0);
        };
        let count = datagram.len().min(buf.len());
        buf[..count].copy_from_slice(&datagram[..count]);
        Ok(count)
    }
}

/// Pipeline link state visible to tests
#[derive(Debug)]
pub struct ControlProbe {
    pub connected: bool,
    pub accept_start: bool,
    pub starts: Vec<(String, RequestFlags, AudioSettings)>,
    pub stops: usize,
}

impl Default for ControlProbe {
    fn default() -> Self {
        Self {
            connected: true,
            accept_start: true,
            starts: Vec::new(),
            stops: 0,
        }
    }
}

pub struct MockControl(pub Rc<RefCell<ControlProbe>>);

impl PipelineControl for MockControl {
    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn start_pipeline(
        &mut self,
        conversation_id: &str,
        flags: RequestFlags,
        audio_settings: &AudioSettings,
    ) -> bool {
        let mut probe = self.0.borrow_mut();
        if !probe.connected || !probe.accept_start {
            return false;
        }
        probe
            .starts
            .push((conversation_id.to_string(), flags, *audio_settings));
        true
    }

    fn stop_pipeline(&mut self) {
        self.0.borrow_mut().stops += 1;
    }
}

/// Media player state visible to tests
#[derive(Debug, Default)]
pub struct MediaProbe {
    pub urls: Vec<String>,
    pub playing: bool,
}

pub struct MockMediaPlayer(pub Rc<RefCell<MediaProbe>>);

impl MediaPlayer for MockMediaPlayer {
    fn play_url(&mut self, url: &str) {
        let mut probe = self.0.borrow_mut();
        probe.urls.push(url.to_string());
        probe.playing = true;
    }

    fn is_playing(&mut self) -> bool {
        self.0.borrow().playing
    }
}

/// VAD gate that replays scripted decisions, then reports silence
pub struct ScriptedVad(pub Rc<RefCell<VecDeque<VadDecision>>>);

impl VoiceActivityDetector for ScriptedVad {
    fn classify(&mut self, _samples: &[i16], _sample_rate: u32, _frame_ms: u32) -> VadDecision {
        self.0
            .borrow_mut()
            .pop_front()
            .unwrap_or(VadDecision::Silence)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// An assistant wired to mocks, with a manual clock
pub struct Harness {
    pub assistant: VoiceAssistant,
    pub mic: Rc<RefCell<MicProbe>>,
    pub transport: Rc<RefCell<TransportProbe>>,
    pub control: Rc<RefCell<ControlProbe>>,
    pub speaker: Option<Rc<RefCell<SpeakerProbe>>>,
    pub media: Option<Rc<RefCell<MediaProbe>>>,
    pub vad: Option<Rc<RefCell<VecDeque<VadDecision>>>>,
    pub events: Rc<RefCell<Vec<AssistantEvent>>>,
    pub clock: Instant,
}

impl Harness {
    pub fn new(config: AssistantConfig) -> Self {
        let mic = Rc::new(RefCell::new(MicProbe::default()));
        let transport = Rc::new(RefCell::new(TransportProbe::default()));
        let control = Rc::new(RefCell::new(ControlProbe::default()));

        let mut assistant = VoiceAssistant::new(
            config,
            Box::new(MockMicrophone(Rc::clone(&mic))),
            Box::new(MockTransport(Rc::clone(&transport))),
            Box::new(MockControl(Rc::clone(&control))),
        )
        .expect("buffers allocate");

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        assistant
            .events_mut()
            .subscribe(move |event| sink.borrow_mut().push(event.clone()));

        Self {
            assistant,
            mic,
            transport,
            control,
            speaker: None,
            media: None,
            vad: None,
            events,
            clock: Instant::now(),
        }
    }

    /// Direct mode: no wake word, no VAD gate
    pub fn direct() -> Self {
        Self::new(AssistantConfig::default())
    }

    /// Wake word mode with a scripted VAD gate
    pub fn wake_word(decisions: impl IntoIterator<Item = VadDecision>) -> Self {
        let mut harness = Self::new(AssistantConfig {
            use_wake_word: true,
            ..AssistantConfig::default()
        });
        let script = Rc::new(RefCell::new(decisions.into_iter().collect::<VecDeque<_>>()));
        harness.assistant = harness
            .assistant
            .with_vad(Some(Box::new(ScriptedVad(Rc::clone(&script)))));
        harness.vad = Some(script);
        harness
    }

    #[must_use]
    pub fn with_speaker(mut self) -> Self {
        let probe = Rc::new(RefCell::new(SpeakerProbe::default()));
        self.assistant = self
            .assistant
            .with_speaker(Box::new(MockSpeaker(Rc::clone(&probe))));
        self.speaker = Some(probe);
        self
    }

    #[must_use]
    pub fn with_media_player(mut self) -> Self {
        let probe = Rc::new(RefCell::new(MediaProbe::default()));
        self.assistant = self
            .assistant
            .with_media_player(Box::new(MockMediaPlayer(Rc::clone(&probe))));
        self.media = Some(probe);
        self
    }

    /// Advance the clock by one period and tick
    pub fn tick(&mut self) {
        self.clock += TICK;
        self.assistant.tick_at(self.clock);
    }

    /// Tick `n` times
    pub fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Jump the clock forward by `after` and tick once
    pub fn advance(&mut self, after: Duration) {
        self.clock += after;
        self.assistant.tick_at(self.clock);
    }

    pub fn speaker(&self) -> &Rc<RefCell<SpeakerProbe>> {
        self.speaker.as_ref().expect("harness has a speaker")
    }

    pub fn media(&self) -> &Rc<RefCell<MediaProbe>> {
        self.media.as_ref().expect("harness has a media player")
    }

    /// Names of every fired event, in order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.borrow().iter().map(AssistantEvent::name).collect()
    }

    /// Drive a direct-mode session up to streaming the microphone
    pub fn start_streaming_session(&mut self) {
        self.assistant.request_start(false, true);
        self.tick(); // StartPipeline -> StartingPipeline
        self.assistant
            .start_streaming(std::net::IpAddr::from([192, 168, 1, 20]), 6056);
        self.tick(); // StartMicrophone -> StartingMicrophone
        self.tick(); // StartingMicrophone -> StreamingMicrophone
    }
}
