mod error;
mod loader;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use passrake_engine::{Dictionary, Engine, EngineConfig, Outcome, ProgressLedger, RecordOutcome};
use sqlx::mysql::MySqlPool;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::Error;

#[derive(Parser, Debug)]
#[command(name = "passrake")]
#[command(about = "Audit exported bcrypt password hashes against a dictionary")]
struct Args {
    /// MySQL connection URL for the exported user records
    #[arg(long, env = "PASSRAKE_MYSQL_URL")]
    mysql: String,

    /// Dictionary file, one candidate word per line
    #[arg(short, long)]
    dict: PathBuf,

    /// File to append recovered credentials to
    #[arg(short, long, default_value = "out.txt")]
    out: PathBuf,

    /// Progress ledger file (created if absent)
    #[arg(long, default_value = ".progress.txt")]
    progress: PathBuf,

    /// Number of concurrent record workers
    #[arg(short = 'w', long, default_value = "20")]
    workers: usize,

    /// Maximum concurrent hash comparisons within one record
    #[arg(long, default_value = "100")]
    inner_workers: usize,

    /// Cancel the run after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Disable progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let pool = MySqlPool::connect(&args.mysql).await?;
    info!("connected to database");
    let records = loader::load_users(&pool).await?;
    info!(count = records.len(), "loaded user records");

    let dict = Dictionary::open(&args.dict)?;
    info!(
        words = dict.len(),
        fingerprint = %dict.identity().fingerprint(),
        "loaded dictionary"
    );
    let ledger = ProgressLedger::open(&args.progress)?;

    let engine = Engine::new(
        dict,
        ledger,
        EngineConfig {
            workers: args.workers,
            inner_workers: args.inner_workers,
            deadline: args.deadline_secs.map(Duration::from_secs),
        },
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Shutting down...");
            interrupt.cancel();
        }
    });

    // Set up progress bar
    let total = records.len() as u64;
    let progress_bar = if !args.no_progress {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut report = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.out)
        .await?;

    let mut matched = 0u64;
    let mut exhausted = 0u64;
    let mut skipped = 0u64;
    let mut malformed = 0u64;

    let mut outcomes = engine.run(records, &cancel);
    while let Some(RecordOutcome { record, outcome }) = outcomes.recv().await {
        match outcome {
            Outcome::Matched { plaintext } => {
                matched += 1;
                let line = format!(
                    "[+] Authentication success: {}[{}] {}\n",
                    record.username, record.email, plaintext
                );
                report.write_all(line.as_bytes()).await?;
            }
            Outcome::Exhausted => exhausted += 1,
            Outcome::MalformedHash => {
                malformed += 1;
                warn!(
                    username = %record.username,
                    email = %record.email,
                    "stored hash is not bcrypt, record skipped"
                );
            }
            Outcome::AlreadyAttempted => {
                skipped += 1;
                info!(
                    username = %record.username,
                    email = %record.email,
                    "skip already checked"
                );
            }
        }
        if let Some(ref pb) = progress_bar {
            pb.inc(1);
        }
    }
    report.flush().await?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("done");
    }

    println!(
        "Done: {matched} recovered, {exhausted} exhausted, {skipped} skipped, {malformed} malformed"
    );
    Ok(())
}
