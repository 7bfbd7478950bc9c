use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_satellite::config::file::config_file_path;
use voice_satellite::voice::{
    CpalMicrophone, CpalSpeaker, Microphone, SAMPLE_RATE, Speaker, VadDecision, create_vad, rms,
    samples_to_wav,
};
use voice_satellite::{Config, Daemon};

/// Satellite - on-device voice assistant endpoint
#[derive(Parser)]
#[command(name = "satellite", version, about)]
struct Cli {
    /// Control server port
    #[arg(long, env = "SATELLITE_PORT")]
    port: Option<u16>,

    /// Local UDP port for streamed audio
    #[arg(long, env = "SATELLITE_UDP_PORT")]
    udp_port: Option<u16>,

    /// Device name advertised to the network
    #[arg(long, env = "SATELLITE_NAME")]
    name: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input and the VAD gate
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Record microphone audio to a WAV file
    Record {
        /// Length in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,
        /// Output path
        #[arg(short, long, default_value = "satellite.wav")]
        output: PathBuf,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voice_satellite=info",
        1 => "info,voice_satellite=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;

    // Flags win over env and file
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(udp_port) = cli.udp_port {
        config.audio.udp_port = udp_port;
    }
    if let Some(name) = cli.name.filter(|n| !n.trim().is_empty()) {
        config.name = name;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Record { seconds, output } => record(seconds, &output).await,
            Command::Config => show_config(&config),
        };
    }

    tracing::info!(
        name = %config.name,
        port = config.server.port,
        "starting voice satellite"
    );

    Daemon::new(config).run().await?;
    Ok(())
}

/// Test microphone input
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut microphone = CpalMicrophone::new()?;
    microphone.start();
    anyhow::ensure!(microphone.is_running(), "microphone did not start");

    let mut vad = create_vad(
        config.assistant.vad_backend,
        config.assistant.vad_aggressiveness,
        config.assistant.rms_threshold,
    );
    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("VAD: {}", vad.as_ref().map_or("none", |v| v.name()));
    println!("---");

    let mut samples = vec![0i16; SAMPLE_RATE as usize];
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let read = microphone.read(&mut samples);
        let frames = &samples[..read];
        let level = rms(frames);
        let peak = frames.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        let speech_frames = vad.as_mut().map_or(0, |vad| {
            frames
                .chunks(480)
                .filter(|frame| vad.classify(frame, SAMPLE_RATE, 30) == VadDecision::Speech)
                .count()
        });

        // Visual meter
        let meter_len = (level / 200).min(50) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {level:5} | Peak: {peak:5} | Speech: {speech_frames:2} | [{meter}]",
            i + 1
        );
    }

    microphone.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut speaker = CpalSpeaker::new()?;
    speaker.start();
    anyhow::ensure!(speaker.is_running(), "speaker did not start");

    let frequency = 440.0_f32;
    let num_samples = 2 * SAMPLE_RATE as usize;

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    let bytes: Vec<u8> = (0..num_samples)
        .flat_map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            // 30% volume
            let sample = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3;
            ((sample * f32::from(i16::MAX)) as i16).to_le_bytes()
        })
        .collect();

    println!("Playing {num_samples} samples at {SAMPLE_RATE} Hz...");

    let mut offset = 0;
    while offset < bytes.len() {
        let written = speaker.play(&bytes[offset..]);
        offset += written;
        if written == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // Let the queue drain before closing the device
    while speaker.queued() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    speaker.stop();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Record microphone audio to a WAV file
async fn record(seconds: u64, output: &std::path::Path) -> anyhow::Result<()> {
    let mut microphone = CpalMicrophone::new()?;
    microphone.start();
    anyhow::ensure!(microphone.is_running(), "microphone did not start");

    println!("Recording {seconds} seconds to {}...", output.display());

    let mut samples = Vec::new();
    let mut chunk = vec![0i16; SAMPLE_RATE as usize / 10];
    let total = usize::try_from(seconds)? * SAMPLE_RATE as usize;

    while samples.len() < total {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let read = microphone.read(&mut chunk);
        samples.extend_from_slice(&chunk[..read]);
    }
    microphone.stop();
    samples.truncate(total);

    let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
    std::fs::write(output, wav)?;

    println!("Wrote {} samples to {}", samples.len(), output.display());
    Ok(())
}

/// Print the resolved configuration
fn show_config(config: &Config) -> anyhow::Result<()> {
    match config_file_path() {
        Some(path) if path.exists() => println!("# Config file: {}", path.display()),
        Some(path) => println!("# Config file: {} (not present)", path.display()),
        None => println!("# Config file: unavailable"),
    }
    println!("{}", config.to_toml()?);
    Ok(())
}
