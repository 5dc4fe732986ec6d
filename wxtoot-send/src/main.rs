//! wxtoot-send - Daemon that posts weather station records to Mastodon
//!
//! Reads newline-delimited JSON records from stdin, queues the ones whose
//! binding is selected and posts them one at a time.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use libwxtoot::config::{resolve_config_path, Config};
use libwxtoot::error::PlatformError;
use libwxtoot::logging::LoggingConfig;
use libwxtoot::platforms::{mock::MockPlatform, Platform};
use libwxtoot::poster::{create_platform, create_poster};
use libwxtoot::service::{Destination, RecordQueue, Worker};
use libwxtoot::types::RecordEnvelope;
use libwxtoot::{Result, WxTootError};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

/// Lines read ahead of the destination
const STDIN_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "wxtoot-send")]
#[command(version)]
#[command(about = "Daemon that posts weather station records to Mastodon")]
#[command(long_about = "\
wxtoot-send - Daemon that posts weather station records to Mastodon

DESCRIPTION:
    wxtoot-send reads one JSON record per line from stdin, as delivered by
    the station software, and posts the selected ones to a Mastodon
    instance. Each line is either

        {\"binding\": \"loop\", \"record\": {...}}

    or a bare record, which counts as an archive record. Records are posted
    in arrival order, one at a time, honouring post_interval, stale and
    max_backlog from the configuration.

USAGE:
    # Follow the station's record stream
    station-export --follow | wxtoot-send

    # Render and log messages without posting
    wxtoot-send --dry-run < records.ndjson

SIGNALS:
    SIGTERM, SIGINT - Stop reading input, finish queued posts and exit

CONFIGURATION:
    Configuration file: ~/.config/wxtoot/config.toml (or WXTOOT_CONFIG)

    [posting]
    binding = [\"archive\"]   # loop, archive or both
    post_interval = 3600     # seconds between posts
    max_tries = 3            # attempts per record
    retry_wait = 5           # seconds between attempts

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "WXTOOT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Render messages without posting (forces skip_upload)
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => resolve_config_path()?,
    };
    let mut config = Config::read(&config_path)?;
    if cli.dry_run {
        config.posting.skip_upload = true;
    }
    config.validate()?;

    info!("wxtoot-send starting for station {}", config.station.name);

    let platform = connect(&config).await?;
    let poster = create_poster(&config, platform)?;

    let queue = Arc::new(RecordQueue::new(config.posting.max_backlog));
    let destination = Destination::new(config.posting.binding.clone(), queue.clone());
    let worker = Worker::from_config(&config, queue.clone(), poster)?;
    let worker_handle = tokio::spawn(worker.run());

    // Set up graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    setup_signal_handlers(shutdown.clone(), wake.clone())?;

    read_records(&destination, &shutdown, &wake).await;

    queue.close();
    info!("input closed, finishing {} queued record(s)", queue.len());
    match worker_handle.await {
        Ok(report) => info!("wxtoot-send stopped: {:?}", report),
        Err(e) => warn!("worker ended abnormally: {}", e),
    }
    Ok(())
}

/// Build the posting platform; bad credentials stop the daemon.
async fn connect(config: &Config) -> Result<Box<dyn Platform>> {
    if config.posting.skip_upload {
        info!("skip_upload is set, records are rendered but not posted");
        return Ok(Box::new(MockPlatform::success("dry-run")));
    }

    let mut platform = create_platform(config)?;
    match platform.authenticate().await {
        Ok(()) => info!("Mastodon credentials verified"),
        Err(WxTootError::Platform(PlatformError::Authentication(e))) => {
            return Err(PlatformError::Authentication(e).into());
        }
        // the instance may just be down; posts will retry
        Err(e) => warn!("could not verify credentials: {}", e),
    }
    Ok(platform)
}

/// Read stdin on a detached thread feeding a channel; the thread is never
/// joined, so a pending read does not delay exit.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(STDIN_BUFFER);

    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });

    rx
}

/// Feed stdin lines to the destination until EOF or a shutdown signal
async fn read_records(destination: &Destination, shutdown: &AtomicBool, wake: &Notify) {
    let mut lines = spawn_stdin_reader();
    info!("reading records from stdin");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, no longer reading records");
            break;
        }

        let line = tokio::select! {
            line = lines.recv() => line,
            _ = wake.notified() => continue,
        };

        match line {
            Some(Ok(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match RecordEnvelope::parse(line) {
                    Ok(envelope) => {
                        let (binding, record) = envelope.into_parts();
                        if !destination.handle(binding, &record) {
                            tracing::debug!("{} record not selected", binding);
                        }
                    }
                    Err(e) => warn!("Skipping input line: {}", e),
                }
            }
            None => break,
            Some(Err(e)) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>, wake: Arc<Notify>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| WxTootError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping gracefully...", sig);
            shutdown.store(true, Ordering::Relaxed);
            wake.notify_one();
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>, _wake: Arc<Notify>) -> Result<()> {
    Ok(())
}
