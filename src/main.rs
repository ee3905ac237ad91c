use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use race_engineer::telemetry::{SimulatorConfig, run_simulation};
use race_engineer::voice::{AudioCapture, AudioPlayback, rms_energy};
use race_engineer::{CliOverrides, Config, Daemon};

/// Race Engineer - voice race engineer for F1 25
#[derive(Parser)]
#[command(name = "engineer", version, about)]
struct Cli {
    /// UDP port the game sends telemetry to
    #[arg(short, long, env = "RACE_ENGINEER_UDP_PORT")]
    port: Option<u16>,

    /// Address to bind the telemetry socket to
    #[arg(long, env = "RACE_ENGINEER_UDP_BIND")]
    bind: Option<IpAddr>,

    /// Config file (defaults to ~/.config/race-engineer/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable microphone and speech output
    #[arg(long, env = "RACE_ENGINEER_NO_VOICE")]
    no_voice: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Run the race engineer (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Radio check. Box this lap, box this lap.")]
        text: String,
    },
    /// Listen to telemetry briefly, then answer a typed question
    Ask {
        /// Question for the engineer
        question: String,
        /// Seconds of telemetry to collect first
        #[arg(short, long, default_value = "3")]
        listen: u64,
    },
    /// Send a synthetic session to a UDP address
    Simulate {
        /// Destination address
        #[arg(short, long, default_value = "127.0.0.1:20777")]
        target: SocketAddr,
        /// Frames per second
        #[arg(short, long, default_value = "10")]
        rate: u32,
        /// Lap time in seconds
        #[arg(long, default_value = "90")]
        lap_time: u64,
        /// Stop after this many laps (0 runs until Ctrl-C)
        #[arg(short, long, default_value = "0")]
        laps: u8,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info",
        1 => "info,race_engineer=debug",
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

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = CliOverrides {
        port: cli.port,
        bind: cli.bind,
        disable_voice: cli.no_voice,
    };
    let config = match &cli.config {
        Some(path) => Config::load_from(path, &overrides)?,
        None => Config::load(&overrides)?,
    };
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!(
                port = config.telemetry.port,
                voice = config.voice.enabled,
                "starting race engineer"
            );
            Daemon::new(config).run().await?;
        }
        Command::TestMic { duration } => test_mic(duration).await?,
        Command::TestSpeaker => test_speaker().await?,
        Command::TestTts { text } => test_tts(&config, &text).await?,
        Command::Ask { question, listen } => {
            println!("Listening for telemetry on {} for {listen}s...", config.telemetry.addr());
            let response = Daemon::new(config)
                .ask(&question, Duration::from_secs(listen))
                .await?;
            println!("{}", response.text);
            println!("\n[{:?}, {} ms]", response.provenance, response.latency.as_millis());
        }
        Command::Simulate {
            target,
            rate,
            lap_time,
            laps,
        } => simulate(target, rate, lap_time, laps).await?,
    }

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (capture, mut audio) = AudioCapture::start()?;
    println!("Sample rate: {} Hz", race_engineer::voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut samples = Vec::new();
        while let Ok(Some(chunk)) = tokio::time::timeout_at(deadline, audio.recv()).await {
            samples.extend_from_slice(&chunk);
        }

        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    let dropped = capture.dropped_chunks();
    tokio::task::spawn_blocking(move || capture.stop()).await?;

    println!("\n---");
    if dropped > 0 {
        println!("{dropped} chunks dropped while reading");
    }
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 24_000_u16;
    let frequency = 440.0_f32;
    let samples: Vec<f32> = (0..u32::from(sample_rate) * 2)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / f32::from(sample_rate);
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());
    let resampled = race_engineer::voice::resample_linear(
        &samples,
        u32::from(sample_rate),
        playback.sample_rate(),
    );
    tokio::task::spawn_blocking(move || playback.play_samples_blocking(resampled)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = config.text_to_speech()?;

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    tokio::task::spawn_blocking(move || playback.play_mp3_blocking(&mp3_data)).await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Stream a synthetic session until the lap limit or Ctrl-C
async fn simulate(target: SocketAddr, rate: u32, lap_time: u64, laps: u8) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let config = SimulatorConfig {
        target,
        rate_hz: rate,
        lap_time: Duration::from_secs(lap_time),
        laps,
        ..SimulatorConfig::default()
    };
    let sent = run_simulation(config, shutdown_rx).await?;
    println!("Sent {sent} datagrams to {target}");
    Ok(())
}
