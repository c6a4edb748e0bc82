//! AAC converter command line
//!
//! Converts one audio file to AAC:
//!
//! ```text
//! aac-converter <source> <destination> [config.toml]
//! aac-converter --generate-config <path>
//! ```
//!
//! Ctrl-C cancels the job. On Unix, SIGUSR1 and SIGUSR2 post an audio session
//! interruption and its end, which pauses and resumes the encode loop.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aac_converter::config::{ConverterConfig, LoggingConfig};
use aac_converter::config_file::{generate_default_config, ConfigFile};
use aac_converter::{
    AacConverter, AudioSession, ChannelObserver, ConversionEvent, ConversionJob, FfmpegBackend,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "aac-converter";

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--generate-config") {
        let path = args.get(1).map(String::as_str).unwrap_or("config.toml");
        return match generate_default_config(path) {
            Ok(()) => {
                println!("Wrote default configuration to {}", path);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to write {}: {}", path, e);
                ExitCode::FAILURE
            }
        };
    }

    if args.len() < 2 || args.len() > 3 {
        eprintln!("usage: {} <source> <destination> [config.toml]", APP_NAME);
        eprintln!("       {} --generate-config <path>", APP_NAME);
        return ExitCode::from(2);
    }

    // Load configuration before logging so the logging section applies
    let (config, config_warning) = match args.get(2) {
        Some(path) => match ConfigFile::from_file(path) {
            Ok(cf) => (cf.into_config(), None),
            Err(e) => (
                ConverterConfig::default(),
                Some(format!("Failed to load config file {}: {}. Using defaults.", path, e)),
            ),
        },
        None => (ConverterConfig::default(), None),
    };

    init_logging(&config.logging);
    if let Some(warning) = config_warning {
        tracing::warn!("{}", warning);
    }

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", aac_converter::ffmpeg_version_info());

    if let Err(e) = aac_converter::ffmpeg::ensure_init() {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }
    aac_converter::install_log_filter();
    tracing::debug!("Configuration loaded: {:?}", config);

    let session = AudioSession::new();
    let (observer, events) = ChannelObserver::new(true);

    let converter = match AacConverter::build(
        ConversionJob::file(&args[0], &args[1]),
        observer,
        config.encoder.clone(),
        Arc::new(FfmpegBackend),
    ) {
        Ok(converter) => converter,
        Err(e) => {
            tracing::error!("Cannot convert {}: {}", args[0], e);
            return ExitCode::FAILURE;
        }
    };
    session.subscribe(&converter);

    #[cfg(unix)]
    spawn_session_signals(session.clone());

    if let Err(e) = converter.start() {
        tracing::error!("Cannot start conversion: {}", e);
        return ExitCode::FAILURE;
    }

    run(&converter, events).await
}

/// Wait for the job's outcome, cancelling on Ctrl-C.
async fn run(converter: &AacConverter, mut events: UnboundedReceiver<ConversionEvent>) -> ExitCode {
    let mut last_decile = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConversionEvent::Progress { fraction, .. }) => {
                    let decile = (fraction * 10.0).floor() as u32;
                    if decile > last_decile {
                        last_decile = decile;
                        tracing::info!("{:.0}% done", fraction * 100.0);
                    }
                }
                Some(ConversionEvent::Completed { .. }) => {
                    tracing::info!(destination = ?converter.destination(), "Conversion finished");
                    return ExitCode::SUCCESS;
                }
                Some(ConversionEvent::Failed { error, .. }) => {
                    tracing::error!(kind = ?error.kind(), "Conversion failed: {}", error);
                    return ExitCode::FAILURE;
                }
                None => return ExitCode::FAILURE,
            },
            _ = &mut ctrl_c => {
                tracing::warn!("Interrupted, cancelling conversion");
                converter.cancel();
                return ExitCode::from(130);
            }
        }
    }
}

/// Map SIGUSR1/SIGUSR2 to audio session interruption began/ended.
#[cfg(unix)]
fn spawn_session_signals(session: Arc<AudioSession>) {
    use aac_converter::SessionEvent;
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut began, mut ended) = match (
            signal(SignalKind::user_defined1()),
            signal(SignalKind::user_defined2()),
        ) {
            (Ok(began), Ok(ended)) => (began, ended),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Cannot install session signal handlers: {}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                Some(()) = began.recv() => session.post(SessionEvent::InterruptionBegan),
                Some(()) = ended.recv() => session.post(SessionEvent::InterruptionEnded),
                else => break,
            }
        }
    });
}

/// Initialize logging with tracing
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("aac_converter={}", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
