//! wxtoot-post - Render one weather record and post it to Mastodon

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use libwxtoot::config::{resolve_config_path, Config};
use libwxtoot::logging::LoggingConfig;
use libwxtoot::platforms::{mock::MockPlatform, Platform};
use libwxtoot::poster::{create_platform, create_poster, PostOutcome};
use libwxtoot::service::{RecordOutcome, RecordQueue, Worker};
use libwxtoot::types::{RecordEnvelope, Visibility};
use libwxtoot::{Result, WxTootError};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "wxtoot-post")]
#[command(version)]
#[command(about = "Render one weather record and post it to Mastodon")]
#[command(long_about = "\
wxtoot-post - Render one weather record and post it to Mastodon

DESCRIPTION:
    Reads a single station record as JSON, renders it through the configured
    template, collects the configured images and posts the result with the
    same retry policy the daemon uses.

    The record is either a flat object ({\"dateTime\": 1413994070, ...}) or
    an envelope ({\"binding\": \"archive\", \"record\": {...}}).

USAGE:
    # Preview the message without posting
    wxtoot-post --dry-run record.json

    # Post a record from stdin
    echo '{\"dateTime\": 1413994070, \"outTemp\": 7.0}' | wxtoot-post

EXIT CODES:
    0 - Success
    1 - Posting failed (network, retries exhausted)
    2 - Configuration or authentication error
    3 - Invalid input
")]
struct Cli {
    /// JSON record file (reads stdin if not provided or '-')
    record: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "WXTOOT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Render the message and print it without posting
    #[arg(long)]
    dry_run: bool,

    /// Override the configured visibility (public, unlisted, private, direct)
    #[arg(long)]
    visibility: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
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
    if let Some(visibility) = &cli.visibility {
        let visibility: Visibility = visibility.parse().map_err(WxTootError::InvalidInput)?;
        config.posting.visibility = Some(visibility);
    }
    config.validate()?;

    let input = read_input(cli.record.as_deref())?;
    let (_, record) = RecordEnvelope::parse(&input)?.into_parts();

    let platform: Box<dyn Platform> = if config.posting.skip_upload {
        Box::new(MockPlatform::success("dry-run"))
    } else {
        create_platform(&config)?
    };
    let poster = create_poster(&config, platform)?;
    let mut worker =
        Worker::from_config(&config, Arc::new(RecordQueue::new(None)), poster)?.with_stale(None);

    let now = chrono::Utc::now().timestamp();
    match worker.process_record(record, now).await? {
        RecordOutcome::Posted { message, outcome } => print_outcome(&cli.format, &message, &outcome),
        other => {
            info!("record not posted: {:?}", other);
            Ok(())
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    let content = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path).map_err(|e| {
            WxTootError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
        })?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| WxTootError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };

    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(WxTootError::InvalidInput("No record provided".to_string()));
    }
    Ok(content)
}

fn print_outcome(format: &str, message: &str, outcome: &PostOutcome) -> Result<()> {
    if format == "json" {
        let value = match outcome {
            PostOutcome::Posted {
                post_id,
                attempts,
                media_count,
            } => serde_json::json!({
                "status": "posted",
                "post_id": post_id,
                "attempts": attempts,
                "media": media_count,
                "message": message,
            }),
            PostOutcome::Skipped => serde_json::json!({
                "status": "skipped",
                "message": message,
            }),
        };
        println!("{}", value);
        return Ok(());
    }

    match outcome {
        PostOutcome::Posted { post_id, .. } => println!("mastodon:{}", post_id),
        PostOutcome::Skipped => println!("{}", message),
    }
    Ok(())
}
