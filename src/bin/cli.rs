//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `upload`, `resume`, `delete`, `list-uploads` and `abort`.
//!
//! Examples:
//! ```bash
//! s3resume --bucket media upload  ./video.mp4 uploads/video.mp4
//! s3resume                upload  ./video.mp4 s3://media/uploads/video.mp4
//! s3resume                resume  /tmp/video.mp4.upload_status
//! s3resume --bucket media delete  uploads/video.mp4
//! s3resume --bucket media list-uploads
//! s3resume                abort   /tmp/video.mp4.upload_status
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use s3resume::config::parse_s3_uri;
use s3resume::{S3MultipartStore, UploadProgress, UploadSummary, Uploader, UploaderConfig};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

// -- Commands

#[derive(Parser)]
#[command(author, version, about = "Resumable multipart uploads to S3-compatible storage")]
struct Cli {
    /// Turn on verbose logging, counts the number of v's
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    /// Target bucket (overrides S3_BUCKET_NAME).
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// AWS region (overrides AWS_REGION).
    #[arg(long, global = true)]
    region: Option<String>,

    /// Custom endpoint for S3-compatible services (overrides AWS_ENDPOINT_URL).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Part size in bytes (overrides S3RESUME_CHUNK_SIZE). On `resume` it
    /// defaults to the size recorded in the ledger.
    #[arg(long = "chunk-size", global = true, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: Option<u64>,

    /// Directory for new ledgers (overrides S3RESUME_LEDGER_DIR).
    #[arg(long = "ledger-dir", global = true)]
    ledger_dir: Option<PathBuf>,

    /// Attempts per storage call (overrides S3RESUME_RETRY_ATTEMPTS).
    #[arg(long = "retries", global = true)]
    retries: Option<u32>,

    /// Pause between attempts, e.g. `2s`, `500ms` (overrides S3RESUME_RETRY_DELAY).
    #[arg(long = "retry-delay", global = true, value_parser = humantime::parse_duration)]
    retry_delay: Option<Duration>,

    /// Do not draw a progress bar.
    #[arg(long = "no-progress", global = true)]
    no_progress: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a local file as a resumable multipart upload.
    Upload {
        /// Local file to upload.
        file: PathBuf,
        /// Object key, or a full s3://bucket/key URI.
        key: String,
    },
    /// Resume an interrupted upload from its ledger file.
    Resume {
        /// Ledger written by a previous `upload`.
        ledger: PathBuf,
    },
    /// Delete an object.
    Delete {
        /// Object key, or a full s3://bucket/key URI.
        key: String,
    },
    /// List multipart uploads that are still open in the bucket.
    ListUploads,
    /// Abort the upload recorded in a ledger file and remove the ledger.
    Abort {
        ledger: PathBuf,
    },
}

// -----------------------------------------------------------------------------
// Command implementations
// -----------------------------------------------------------------------------

/// `key` may carry its own bucket as `s3://bucket/key`.
fn resolve_target(cfg: &UploaderConfig, key: &str) -> Result<(String, String)> {
    if key.starts_with("s3://") {
        return Ok(parse_s3_uri(key)?);
    }
    Ok((cfg.require_bucket()?.to_string(), key.to_string()))
}

fn print_summary(summary: &UploadSummary) -> Result<()> {
    let elapsed = summary
        .completed_at
        .duration_since(summary.started_at)
        .unwrap_or_default();
    safe_println!(
        "Uploaded s3://{}/{} ({} bytes, {} parts: {} sent, {} resumed) in {:.2}s",
        summary.bucket,
        summary.key,
        summary.total_bytes,
        summary.parts,
        summary.parts_uploaded,
        summary.parts_skipped,
        elapsed.as_secs_f64()
    );
    Ok(())
}

async fn list_uploads_cmd(uploader: &Uploader) -> Result<()> {
    let bucket = uploader.config().require_bucket()?.to_string();
    let uploads = uploader.list_open_uploads(&bucket).await?;

    if uploads.is_empty() {
        safe_println!("No open multipart uploads in bucket '{}'.", bucket);
        return Ok(());
    }

    safe_println!("\nFound {} open upload(s) in '{}':", uploads.len(), bucket);
    safe_println!("{:<28} {:<40} {}", "Initiated", "Key", "Upload ID");
    safe_println!("{}", "-".repeat(100));
    for u in uploads {
        safe_println!(
            "{:<28} {:<40} {}",
            u.initiated_at.as_deref().unwrap_or("-"),
            u.key,
            u.upload_id
        );
    }
    Ok(())
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbosity
    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    // Initialize tracing-log bridge to capture log crate messages from dependencies
    tracing_log::LogTracer::init().ok();

    let mut cfg = UploaderConfig::from_env();
    if cli.bucket.is_some() {
        cfg.bucket = cli.bucket.clone();
    }
    if cli.region.is_some() {
        cfg.region = cli.region.clone();
    }
    if cli.endpoint.is_some() {
        cfg.endpoint = cli.endpoint.clone();
    }
    if let Some(dir) = &cli.ledger_dir {
        cfg.ledger_dir = dir.clone();
    }
    if cli.retries.is_some() || cli.retry_delay.is_some() {
        let attempts = cli.retries.unwrap_or(cfg.retry.max_attempts);
        let delay = cli.retry_delay.unwrap_or(cfg.retry.delay);
        cfg = cfg.with_retry(attempts, delay);
    }

    let store = S3MultipartStore::from_config(&cfg)
        .await
        .context("failed to build S3 client")?;
    let progress = Arc::new(if cli.no_progress {
        UploadProgress::hidden()
    } else {
        UploadProgress::with_bar("UPLOAD")
    });
    let uploader = Uploader::new(Arc::new(store), cfg).with_progress(progress);
    let chunk_size = cli.chunk_size;

    match cli.cmd {
        Command::Upload { file, key } => {
            let chunk_size = chunk_size.unwrap_or(uploader.config().chunk_size);
            let (bucket, key) = resolve_target(uploader.config(), &key)?;
            info!("Uploading {} to s3://{}/{}", file.display(), bucket, key);
            let ledger_path = uploader.ledger_path_for(&file);
            let summary = uploader
                .start_upload(&file, &bucket, &key, chunk_size)
                .await
                .with_context(|| {
                    format!("upload failed; if the ledger {} exists, `resume` it", ledger_path.display())
                })?;
            print_summary(&summary)?;
        }

        Command::Resume { ledger } => {
            let summary = uploader.resume_upload(&ledger, chunk_size).await?;
            print_summary(&summary)?;
        }

        Command::Delete { key } => {
            let (bucket, key) = resolve_target(uploader.config(), &key)?;
            uploader.delete_object(&bucket, &key).await?;
            safe_println!("Deleted s3://{}/{}", bucket, key);
        }

        Command::ListUploads => list_uploads_cmd(&uploader).await?,

        Command::Abort { ledger } => {
            let aborted = uploader.abort_from_ledger(&ledger).await?;
            safe_println!(
                "Aborted upload {} of s3://{}/{} ({}/{} parts had been sent)",
                aborted.upload_id,
                aborted.bucket,
                aborted.key,
                aborted.completed_count(),
                aborted.total_parts
            );
        }
    }

    Ok(())
}
