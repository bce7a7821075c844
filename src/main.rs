use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use sysinfo::System;

use meditation_session_audio::assets::{AssetResolver, CachedAssetResolver, PassthroughResolver};
use meditation_session_audio::audio_system::preview::PREVIEW_LENGTH;
use meditation_session_audio::audio_system::source::{AMBIANCE_CLIP_LENGTH, SILENCE_CLIP_LENGTH};
use meditation_session_audio::audio_system::{
    AmbianceSound, AudioBackend, RecordingBackend, RodioBackend,
};
use meditation_session_audio::config::{EngineSettings, GuidanceLevel, SessionConfig};
use meditation_session_audio::error::AppResult;
use meditation_session_audio::messaging::{
    CommandExecutor, CommandResult, EngineCommand, EventBus, SessionEvent,
};
use meditation_session_audio::scheduling::{Scheduler, ThreadScheduler};
use meditation_session_audio::SessionEngine;

const LOG_TARGET_STARTUP: &str = "meditation_audio::startup";

#[derive(Parser, Debug)]
#[command(name = "meditation-audio", version, about = "Run a timed meditation audio session")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record playback instead of opening an audio device
    #[arg(long)]
    dry_run: bool,

    /// Ambiance sound (none, rain, ocean, forest, stream, wind, fireplace, night)
    #[arg(long)]
    sound: Option<AmbianceSound>,

    /// Session length in minutes; 0 runs until stopped
    #[arg(long)]
    minutes: Option<u32>,

    /// 0 none, 1 bells only, 2 gentle voice, 3 continuous voice
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    guidance: Option<u8>,

    /// Disable interval bells
    #[arg(long)]
    no_bells: bool,

    /// Strike a double bell just before the end of a silent session
    #[arg(long)]
    end_bell: bool,

    /// Play a short sample of a sound and exit
    #[arg(long)]
    preview: Option<AmbianceSound>,
}

/// Initialize tracing with file rotation
///
/// Logs are written to `<config dir>/MeditationAudio/logs/`, rotated daily.
/// Debug builds also log to the console.
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = EngineSettings::log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "meditation-audio.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let mut system = System::new_all();
    system.refresh_all();

    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());

    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Starting meditation-audio v{} on {}",
        version,
        std::env::consts::ARCH
    );
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
    tracing::debug!(
        target: LOG_TARGET_STARTUP,
        "CPUs: {}, memory: {} MiB",
        system.cpus().len(),
        system.total_memory() / (1024 * 1024)
    );
}

fn session_config(args: &Args, settings: &EngineSettings) -> SessionConfig {
    let mut config = settings.last_session.clone().unwrap_or_default();

    if let Some(sound) = args.sound {
        config.sound = sound;
    }
    if let Some(minutes) = args.minutes {
        config.duration_minutes = minutes;
    }
    if let Some(level) = args.guidance.and_then(|level| GuidanceLevel::try_from(level).ok()) {
        config.guidance_level = level;
    }
    if args.no_bells {
        config.bells_enabled = false;
    }
    if args.end_bell {
        config.end_double_bell = true;
    }
    config
}

fn build_engine(
    args: &Args,
    settings: &EngineSettings,
    scheduler: Arc<dyn Scheduler>,
    bus: EventBus,
) -> AppResult<SessionEngine> {
    let (backend, resolver): (Arc<dyn AudioBackend>, Arc<dyn AssetResolver>) = if args.dry_run {
        tracing::info!("Dry run: recording playback instead of opening an audio device");
        let backend = RecordingBackend::new(Arc::clone(&scheduler));
        backend.set_clip_length("ambiance_", AMBIANCE_CLIP_LENGTH);
        backend.set_clip_length("silence", SILENCE_CLIP_LENGTH);
        (
            Arc::new(backend),
            Arc::new(PassthroughResolver::new(settings.assets_dir.clone())),
        )
    } else {
        let backend = RodioBackend::try_default().context("Failed to open audio output")?;
        (
            Arc::new(backend),
            Arc::new(CachedAssetResolver::from_settings(settings)),
        )
    };

    Ok(SessionEngine::new(scheduler, backend, resolver, settings, bus))
}

/// Forward console lines to the executor
fn spawn_console_reader(
    sender: crossbeam_channel::Sender<EngineCommand>,
    base: SessionConfig,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                if line.trim().is_empty() {
                    continue;
                }
                match EngineCommand::parse(&line, &base) {
                    Ok(command) => {
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
        })?;
    Ok(())
}

fn main() -> AppResult<()> {
    let args = Args::parse();

    initialize_tracing();
    log_runtime_environment();

    let settings_path = match &args.config {
        Some(path) => path.clone(),
        None => EngineSettings::default_path().context("Failed to locate settings")?,
    };
    let mut settings =
        EngineSettings::load(Some(settings_path.as_path())).context("Failed to load settings")?;
    let config = session_config(&args, &settings);

    let scheduler: Arc<dyn Scheduler> =
        Arc::new(ThreadScheduler::new().context("Failed to start timer thread")?);
    let bus = EventBus::new();
    let (events, _subscription) = bus.subscribe();

    let engine = Arc::new(build_engine(&args, &settings, scheduler, bus)?);
    let executor = CommandExecutor::new(Arc::clone(&engine));

    if let Some(sound) = args.preview {
        if let CommandResult::Error(e) = executor.execute_sync(EngineCommand::PreviewSound { sound }) {
            anyhow::bail!("Preview failed: {}", e);
        }
        thread::sleep(PREVIEW_LENGTH + Duration::from_millis(500));
        engine.dispose();
        return Ok(());
    }

    settings.last_session = Some(config.clone());
    if let Err(e) = settings.save_to(&settings_path) {
        tracing::warn!("Could not remember session settings: {}", e);
    }

    let sender = executor.sender();
    let interrupt = executor.sender();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(EngineCommand::Quit);
    })
    .context("Failed to install Ctrl+C handler")?;

    let worker = executor
        .start_processing()
        .context("Failed to start command executor")?;
    spawn_console_reader(sender.clone(), config.clone())
        .context("Failed to start console reader")?;

    println!("Commands: start [sound] [minutes] [level], stop, skip <seconds>, preview <sound>, status, quit");
    let _ = sender.send(EngineCommand::StartSession { config });

    loop {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => {
                println!("{}", event.description());
                if event == (SessionEvent::SessionStopped { completed: true }) {
                    let _ = sender.send(EngineCommand::Quit);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if worker.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    engine.dispose();
    tracing::info!("Goodbye");
    Ok(())
}
