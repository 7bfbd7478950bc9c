//! Daemon loop tests
//!
//! Runs the command/tick loop against a mocked assistant.

use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use voice_satellite::api::ControlCommand;
use voice_satellite::config::SchedulerConfig;
use voice_satellite::daemon::{apply_command, drive};
use voice_satellite::{ControllerState, PipelineEvent, PipelineEventType};

mod common;
use common::Harness;

const SCHEDULER: SchedulerConfig = SchedulerConfig {
    tick_ms: 16,
    high_frequency_tick_ms: 4,
};

#[tokio::test]
async fn test_drive_applies_commands_and_publishes_state() {
    let mut h = Harness::direct();
    let (tx, rx) = mpsc::channel(8);
    let (status_tx, status_rx) = watch::channel(ControllerState::Idle);

    tx.send(ControlCommand::Start {
        continuous: false,
        silence_detection: true,
    })
    .await
    .unwrap();

    drive(
        &mut h.assistant,
        rx,
        &status_tx,
        &SCHEDULER,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await;

    assert_eq!(h.control.borrow().starts.len(), 1);

    // Shutdown stops the run that was in flight and settles
    assert_eq!(h.control.borrow().stops, 1);
    assert_eq!(h.assistant.state(), ControllerState::Idle);
    assert_eq!(*status_rx.borrow(), ControllerState::Idle);
}

#[tokio::test]
async fn test_shutdown_closes_streaming_microphone() {
    let mut h = Harness::direct();
    h.start_streaming_session();
    assert!(h.mic.borrow().running);
    let (_tx, rx) = mpsc::channel(1);
    let (status_tx, status_rx) = watch::channel(ControllerState::StreamingMicrophone);

    drive(
        &mut h.assistant,
        rx,
        &status_tx,
        &SCHEDULER,
        std::future::ready(()),
    )
    .await;

    assert_eq!(h.control.borrow().stops, 1);
    assert_eq!(h.mic.borrow().stops, 1);
    assert!(h.mic.borrow().stopped);
    assert_eq!(h.assistant.state(), ControllerState::Idle);
    assert_eq!(*status_rx.borrow(), ControllerState::Idle);
}

#[test]
fn test_drive_returns_on_shutdown_with_idle_assistant() {
    let mut h = Harness::direct();
    let (_tx, rx) = mpsc::channel(1);
    let (status_tx, status_rx) = watch::channel(ControllerState::Idle);

    tokio_test::block_on(drive(
        &mut h.assistant,
        rx,
        &status_tx,
        &SCHEDULER,
        std::future::ready(()),
    ));

    assert_eq!(*status_rx.borrow(), ControllerState::Idle);
    assert_eq!(h.control.borrow().stops, 0);
}

#[test]
fn test_apply_command_routes_every_command() {
    let mut h = Harness::direct();

    apply_command(
        &mut h.assistant,
        ControlCommand::Start {
            continuous: true,
            silence_detection: false,
        },
    );
    assert_eq!(h.assistant.state(), ControllerState::StartPipeline);
    assert!(h.assistant.is_continuous());
    assert!(!h.assistant.silence_detection());

    h.tick();
    apply_command(
        &mut h.assistant,
        ControlCommand::StreamStarted {
            address: IpAddr::from([10, 0, 0, 2]),
            port: 6056,
        },
    );
    assert_eq!(h.assistant.state(), ControllerState::StartMicrophone);

    h.ticks(2);
    apply_command(
        &mut h.assistant,
        ControlCommand::Event(
            PipelineEvent::new(PipelineEventType::SttEnd).with_arg("text", "lights off"),
        ),
    );
    assert_eq!(h.assistant.state(), ControllerState::StopMicrophone);
    assert_eq!(h.event_names(), vec!["stt_end"]);

    apply_command(&mut h.assistant, ControlCommand::Stop);
    assert!(!h.assistant.is_continuous());
    assert_eq!(h.assistant.desired_state(), ControllerState::Idle);

    apply_command(&mut h.assistant, ControlCommand::FailedToStart);
    assert_eq!(h.event_names(), vec!["stt_end", "error"]);
}
