use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hexbadge_config::{BadgeConfig, FirmwareLocation};
use hexbadge_runtime::engine::{BadgeRuntime, RunOutcome, RuntimeOptions};
use hexbadge_runtime::protocol::{HexButton, HostIpcMessage, SystemEvent};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Run hexbadge firmware in a sandbox on the host instead of on the badge.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Run {
        /// Path to the badge config file.
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "hexbadge_runtime=info,hexbadge=info") };
    }

    let subscriber = tracing_subscriber::Registry::default()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::from_default_env());
    subscriber.try_init()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = BadgeConfig::load(&config)
                .map_err(|e| anyhow::anyhow!("Failed to load badge config: {}", e))?;
            run_firmware(&config).await
        }
    }
}

async fn load_firmware_binary(config: &BadgeConfig) -> Result<Vec<u8>> {
    match config.get_firmware_location() {
        FirmwareLocation::Path(path) => std::fs::read(path).map_err(anyhow::Error::from),
        FirmwareLocation::Url(url) => {
            let bytes = reqwest::get(url)
                .await?
                .error_for_status()?
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to fetch firmware binary: {}", e))?;
            Ok(bytes.to_vec())
        }
    }
}

async fn run_firmware(config: &BadgeConfig) -> Result<()> {
    let firmware = load_firmware_binary(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load firmware binary: {}", e))?;

    let runtime = Arc::new(BadgeRuntime::new(RuntimeOptions::create_from_badge_config(
        config,
    ))?);

    if let Some(dir) = config.frames.dir.clone() {
        std::fs::create_dir_all(&dir)?;
        let frame_count = AtomicU64::new(0);
        runtime.add_frame_buffer_handler(Box::new(move |frame| {
            let n = frame_count.fetch_add(1, Ordering::Relaxed);
            let path = dir.join(format!("frame-{n:06}.png"));
            if let Err(e) = frame.save(&path) {
                tracing::warn!("failed to write {}: {e}", path.display());
            }
        }));
    }

    // Forward stdin lines as badge input: `a`..`f` press a hex button,
    // `boot` presses the boot button.
    let input_runtime = runtime.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            match parse_input_line(line) {
                Some(message) => input_runtime.send_host_ipc_message(message),
                None if line.is_empty() => {}
                None => tracing::warn!("unrecognized input: {line:?} (try a-f or boot)"),
            }
        }
    });

    tracing::info!("Firmware is starting ({})", config.name);
    match runtime.start(firmware).await? {
        RunOutcome::Finished => tracing::info!("Program finished"),
        RunOutcome::Superseded => tracing::info!("Program superseded"),
    }

    Ok(())
}

fn parse_input_line(line: &str) -> Option<HostIpcMessage> {
    let button = match line {
        "a" | "A" => HexButton::A,
        "b" | "B" => HexButton::B,
        "c" | "C" => HexButton::C,
        "d" | "D" => HexButton::D,
        "e" | "E" => HexButton::E,
        "f" | "F" => HexButton::F,
        "boot" => return Some(HostIpcMessage::System(SystemEvent::BootButton)),
        _ => return None,
    };
    Some(HostIpcMessage::HexButton(button))
}
