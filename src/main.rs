//! FastPay sync CLI
//!
//! Queue device records for upload, drain persisted queues, and run the
//! transaction merge processors over exported messages.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fastpay_sync::config::Config;
use fastpay_sync::contacts::Contact;
use fastpay_sync::merge::{MergeOptions, MergeableMessage, ProcessorKind};
use fastpay_sync::messages::{NotificationRecord, SmsRecord};
use fastpay_sync::sync::store::decode_snapshot;
use fastpay_sync::sync::{
    BatchUploader, FileSnapshotStore, HttpTransport, SnapshotStore, SyncRecord,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// FastPay device sync and message merge tool
#[derive(Parser)]
#[command(name = "fastpay-sync")]
#[command(about = "Upload device records in batches and merge transaction messages")]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "FASTPAY_API_URL")]
    api_url: Option<String>,

    /// Device identifier sent with every batch
    #[arg(long, global = true, env = "FASTPAY_DEVICE_ID")]
    device_id: Option<String>,

    /// Directory holding the persisted queues
    #[arg(long, global = true, env = "FASTPAY_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue contacts from a JSON array and upload them
    QueueContacts { file: PathBuf },

    /// Queue SMS records from a JSON array and upload them
    QueueMessages { file: PathBuf },

    /// Queue notifications from a JSON array and upload them
    QueueNotifications { file: PathBuf },

    /// Upload whatever is left in the persisted queues
    Flush {
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Show pending counts per queue
    Status,

    /// Drop persisted queues
    Clear {
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },

    /// Merge a newest-first JSON array of messages and print the result
    Merge {
        /// Processor id (see `processors`)
        #[arg(long, default_value = "neft_inr")]
        processor: String,

        /// Last two account digits for the account-scoped processor
        #[arg(long)]
        account: Option<String>,

        file: PathBuf,
    },

    /// List merge processors
    Processors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Contacts,
    Messages,
    Notifications,
}

impl Kind {
    const ALL: [Kind; 3] = [Kind::Contacts, Kind::Messages, Kind::Notifications];

    fn snapshot_key(self) -> &'static str {
        match self {
            Kind::Contacts => Contact::SNAPSHOT_KEY,
            Kind::Messages => SmsRecord::SNAPSHOT_KEY,
            Kind::Notifications => NotificationRecord::SNAPSHOT_KEY,
        }
    }

    fn selected(kind: Option<Kind>) -> Vec<Kind> {
        kind.map(|k| vec![k]).unwrap_or_else(|| Self::ALL.to_vec())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::default();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(device_id) = cli.device_id {
        config.device_id = device_id;
    }
    if let Some(dir) = cli.state_dir {
        config.state_dir = dir;
    }

    match cli.command {
        Commands::QueueContacts { file } => cmd_queue::<Contact>(&config, &file).await,
        Commands::QueueMessages { file } => cmd_queue::<SmsRecord>(&config, &file).await,
        Commands::QueueNotifications { file } => {
            cmd_queue::<NotificationRecord>(&config, &file).await
        }
        Commands::Flush { kind } => cmd_flush(&config, kind).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Clear { kind } => cmd_clear(&config, kind).await,
        Commands::Merge {
            processor,
            account,
            file,
        } => cmd_merge(&processor, account, &file),
        Commands::Processors => cmd_processors(),
    }
}

// ============================================================================
// Upload commands
// ============================================================================

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn build_uploader<T: SyncRecord>(config: &Config) -> Result<BatchUploader<T>> {
    if config.device_id.trim().is_empty() {
        anyhow::bail!("No device id configured (use --device-id or FASTPAY_DEVICE_ID)");
    }
    fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("Failed to create {}", config.state_dir.display()))?;

    let store = Arc::new(FileSnapshotStore::new(config.queue_file(T::SNAPSHOT_KEY)));
    let transport = Arc::new(HttpTransport::new(
        &config.api_base_url,
        config.upload_timeout,
    )?);
    Ok(BatchUploader::new(store, transport, config.uploader())?)
}

/// Run rounds back to back until the queue is empty or a round fails
async fn drain<T: SyncRecord>(uploader: &BatchUploader<T>) -> usize {
    loop {
        uploader.wait_idle().await;
        let before = uploader.queue_size();
        if before == 0 {
            break;
        }
        uploader.flush();
        uploader.wait_idle().await;
        if uploader.queue_size() >= before {
            warn!(
                pending = before,
                kind = T::SNAPSHOT_KEY,
                "Upload round failed, records kept for next run"
            );
            break;
        }
    }
    uploader.shutdown().await;
    uploader.queue_size()
}

async fn cmd_queue<T: SyncRecord>(config: &Config, file: &Path) -> Result<()> {
    let records: Vec<T> = read_json(file)?;
    let total = records.len();

    let uploader = build_uploader::<T>(config)?;
    uploader.initialize_from_storage().await;
    let accepted = uploader.queue_items(records);
    info!(accepted, total, kind = T::SNAPSHOT_KEY, "Records queued");

    let pending = drain(&uploader).await;
    println!(
        "{}: queued {} of {}, {} still pending",
        T::SNAPSHOT_KEY,
        accepted,
        total,
        pending
    );
    Ok(())
}

async fn flush_kind<T: SyncRecord>(config: &Config) -> Result<()> {
    let uploader = build_uploader::<T>(config)?;
    uploader.initialize_from_storage().await;
    let before = uploader.queue_size();
    let pending = drain(&uploader).await;
    println!(
        "{}: uploaded {}, {} still pending",
        T::SNAPSHOT_KEY,
        before.saturating_sub(pending),
        pending
    );
    Ok(())
}

async fn cmd_flush(config: &Config, kind: Option<Kind>) -> Result<()> {
    for kind in Kind::selected(kind) {
        match kind {
            Kind::Contacts => flush_kind::<Contact>(config).await?,
            Kind::Messages => flush_kind::<SmsRecord>(config).await?,
            Kind::Notifications => flush_kind::<NotificationRecord>(config).await?,
        }
    }
    Ok(())
}

async fn pending_count<T: SyncRecord>(config: &Config) -> Result<usize> {
    let store = FileSnapshotStore::new(config.queue_file(T::SNAPSHOT_KEY));
    match store.read().await? {
        Some(contents) => Ok(decode_snapshot::<T>(&contents)?.records.len()),
        None => Ok(0),
    }
}

async fn cmd_status(config: &Config) -> Result<()> {
    println!("State dir: {}", config.state_dir.display());
    println!("Backend:   {}", config.api_base_url);
    println!();

    for kind in Kind::ALL {
        let count = match kind {
            Kind::Contacts => pending_count::<Contact>(config).await,
            Kind::Messages => pending_count::<SmsRecord>(config).await,
            Kind::Notifications => pending_count::<NotificationRecord>(config).await,
        };
        match count {
            Ok(count) => println!("{:<14} {} pending", kind.snapshot_key(), count),
            Err(e) => println!("{:<14} unreadable ({})", kind.snapshot_key(), e),
        }
    }
    Ok(())
}

async fn cmd_clear(config: &Config, kind: Option<Kind>) -> Result<()> {
    for kind in Kind::selected(kind) {
        let path = config.queue_file(kind.snapshot_key());
        if !path.exists() {
            continue;
        }
        FileSnapshotStore::new(&path).clear().await?;
        println!("Cleared {}", kind.snapshot_key());
    }
    Ok(())
}

// ============================================================================
// Merge commands
// ============================================================================

fn cmd_merge(processor: &str, account: Option<String>, file: &Path) -> Result<()> {
    let kind = ProcessorKind::from_id(processor)?;
    let messages: Vec<MergeableMessage> = read_json(file)?;
    let options = MergeOptions {
        account_last_digits: account,
    };

    let merged = kind.process(&messages, &options)?;
    info!(
        processor = kind.id(),
        input = messages.len(),
        output = merged.len(),
        "Messages merged"
    );
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}

fn cmd_processors() -> Result<()> {
    let default = ProcessorKind::default();
    for kind in ProcessorKind::ALL {
        let marker = if kind == default { " (default)" } else { "" };
        println!("{:<12} {}{}", kind.id(), kind.description(), marker);
    }
    Ok(())
}
