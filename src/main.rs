use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use concierge_voice::audio::{AudioArtifact, CpalDeviceGate, DrawingSurface, TextSurface};
use concierge_voice::effects::{DeviceEffectRunner, RunnerOptions};
use concierge_voice::settings::{
    load_settings, load_settings_from, save_settings, settings_path, AppSettings,
};
use concierge_voice::upload::BackendClient;
use concierge_voice::{spawn_session, Snapshot, UiState};
use env_logger::Env;
use tokio::sync::{oneshot, watch};

/// Terminal width used for the waveform sparkline
const WAVEFORM_COLUMNS: u32 = 64;

#[derive(Parser)]
#[command(name = "concierge-voice")]
#[command(about = "Record a voice message and send it to the concierge backend")]
struct Cli {
    /// Backend base URL (overrides settings and CONCIERGE_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record until Enter is pressed (or for a fixed time), then upload
    Record {
        /// Stop automatically after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Do not draw the live waveform
        #[arg(long)]
        no_waveform: bool,

        /// Keep the recording: a file path, a directory, or nothing for a
        /// timestamped file in the current directory
        #[arg(long, value_name = "PATH")]
        save: Option<Option<PathBuf>>,
    },
    /// Show the default input device and settings location
    Check,
    /// Show the persisted settings; any option given is saved first
    Config {
        /// Stop recordings after this many seconds (0 disables the limit)
        #[arg(long)]
        max_seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Command::Config { max_seconds } = cli.command {
        return config(cli.api_base, max_seconds);
    }

    let mut settings = load_settings();
    if let Some(api_base) = cli.api_base {
        settings.api_base = api_base;
    }

    match cli.command {
        Command::Record {
            seconds,
            no_waveform,
            save,
        } => record(settings, seconds, no_waveform, save).await,
        Command::Check => check(&settings),
        Command::Config { .. } => Ok(()),
    }
}

fn config(api_base: Option<String>, max_seconds: Option<u64>) -> Result<(), Box<dyn Error>> {
    let path = settings_path()?;
    // Persisted values only; environment overrides are not written back.
    let mut settings = load_settings_from(&path);

    if api_base.is_some() || max_seconds.is_some() {
        if let Some(api_base) = api_base {
            settings.api_base = api_base;
        }
        if let Some(max_seconds) = max_seconds {
            settings.max_recording_secs = max_seconds;
        }
        save_settings(&settings)?;
        eprintln!("Saved {}", path.display());
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn check(settings: &AppSettings) -> Result<(), Box<dyn Error>> {
    match settings_path() {
        Ok(path) => println!("Settings file: {}", path.display()),
        Err(e) => println!("Settings file: unavailable ({})", e),
    }
    println!("Backend: {}", settings.api_base());

    let device = CpalDeviceGate::default_device_info()?;
    println!(
        "Input device: {} ({} Hz, {} ch, {})",
        device.name, device.sample_rate, device.channels, device.sample_format
    );
    Ok(())
}

async fn record(
    settings: AppSettings,
    seconds: Option<u64>,
    no_waveform: bool,
    save: Option<Option<PathBuf>>,
) -> Result<(), Box<dyn Error>> {
    let surface: Option<Box<dyn DrawingSurface>> = if no_waveform {
        None
    } else {
        Some(Box::new(TextSurface::new(
            WAVEFORM_COLUMNS,
            settings.waveform_height,
        )))
    };

    let runner = DeviceEffectRunner::new(
        Arc::new(CpalDeviceGate::new()),
        RunnerOptions::from_settings(&settings),
        surface,
    );
    let uploader = Arc::new(BackendClient::new(settings.api_base()));
    let (session, task) = spawn_session(runner, uploader, &settings);
    let mut snapshots = session.subscribe();

    session.start().await?;
    let started = snapshots
        .wait_for(|s| !matches!(s.session, UiState::Idle | UiState::Acquiring))
        .await?
        .clone();

    if let UiState::Recording { .. } = started.session {
        eprintln!("Recording... press Enter to stop");
        if no_waveform {
            tokio::spawn(show_timer(session.subscribe()));
        }

        // Detached so a pending read never holds up runtime shutdown.
        let (enter_tx, enter) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            let _ = enter_tx.send(());
        });
        let limit = async {
            match seconds {
                Some(n) => tokio::time::sleep(Duration::from_secs(n)).await,
                None => std::future::pending::<()>().await,
            }
        };
        let mut ended = session.subscribe();

        tokio::select! {
            _ = enter => {}
            _ = limit => log::info!("Time limit reached"),
            // Max-duration guard or device loss
            _ = ended.wait_for(|s| !s.recording) => {}
        }

        session.stop().await?;
    }

    let finished = snapshots
        .wait_for(|s| {
            matches!(
                s.session,
                UiState::Completed { .. } | UiState::Failed { .. } | UiState::Idle
            ) && !s.conversation.loading
        })
        .await?
        .clone();
    eprintln!();

    if let Some(target) = save {
        match session.last_recording() {
            Some(artifact) => {
                let path = save_recording(&artifact, target)?;
                println!("Saved recording to {}", path.display());
            }
            None => log::warn!("No recording to save"),
        }
    }

    session.exit().await?;
    task.await?;

    report(&finished)
}

fn save_recording(
    artifact: &AudioArtifact,
    target: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = match target {
        Some(dir) if dir.is_dir() => dir.join(artifact.default_file_name()),
        Some(path) => path,
        None => PathBuf::from(artifact.default_file_name()),
    };
    artifact.save(&path)?;
    Ok(path)
}

async fn show_timer(mut snapshots: watch::Receiver<Snapshot>) {
    while snapshots.changed().await.is_ok() {
        let label = match &snapshots.borrow().session {
            UiState::Recording { timer_label, .. } => timer_label.clone(),
            _ => break,
        };
        eprint!("\r{}", label);
    }
}

fn report(snapshot: &Snapshot) -> Result<(), Box<dyn Error>> {
    if let UiState::Failed { message, .. } = &snapshot.session {
        return Err(message.clone().into());
    }
    if let UiState::Completed {
        bytes,
        mime_type,
        duration_secs,
    } = &snapshot.session
    {
        println!("Recorded {}s ({} bytes, {})", duration_secs, bytes, mime_type);
    }

    let conversation = &snapshot.conversation;
    if let Some(error) = &conversation.error {
        return Err(error.clone().into());
    }
    if let Some(text) = &conversation.reply_text {
        println!("{}", text);
    }
    if let Some(audio) = &conversation.reply_audio {
        println!("Reply audio: {}", audio);
    }
    Ok(())
}
