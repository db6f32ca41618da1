//! tripai-sync - TripAI pending-analysis queue tool
//!
//! Captures photos for landmark analysis, queues them while offline and drains
//! the queue against the analyze server once connectivity returns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripai_common::config::{
    default_config_path, load_toml_config, write_toml_config, RootFolderLayout,
    RootFolderResolver, TomlConfig,
};
use tripai_common::events::SyncEvent;
use tripai_common::time::{parse_iso8601, to_iso8601};
use tripai_common::LandmarkRecord;
use tripai_sync::capture::CaptureOutcome;
use tripai_sync::connectivity::{
    join_background_tasks, ConnectivityMonitor, ConnectivityProbe, SyncPrompt, SyncTrigger,
};
use tripai_sync::journal::RecordKey;
use tripai_sync::{AppContext, SyncSummary};

/// Command-line arguments for tripai-sync
#[derive(Parser, Debug)]
#[command(name = "tripai-sync")]
#[command(about = "Offline landmark analysis queue for TripAI")]
#[command(version)]
struct Args {
    /// Root folder holding the database and image cache
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to <config dir>/tripai/tripai.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analyze server base URL
    #[arg(long, global = true, env = "TRIPAI_SERVER_URL")]
    server_url: Option<String>,

    /// Device identifier sent with each analysis
    #[arg(long, global = true, env = "TRIPAI_DEVICE_ID")]
    device_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config file and create the root folder
    Init,

    /// Analyze a photo now, queueing it if the device is offline
    Capture {
        photo: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
    },

    /// Queue a photo for later analysis without contacting the server
    Enqueue {
        photo: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        /// Capture time (RFC 3339); defaults to now
        #[arg(long)]
        created_at: Option<String>,
    },

    /// Show queue size and connectivity
    Status,

    /// Drain the pending queue once
    Sync,

    /// Offer a sync at startup and whenever the server becomes reachable
    Watch {
        /// Sync without asking
        #[arg(long)]
        yes: bool,
    },

    /// Landmark journal
    #[command(subcommand)]
    Journal(JournalCommand),
}

#[derive(Subcommand, Debug)]
enum JournalCommand {
    /// List journal records
    List {
        /// Only records the user kept
        #[arg(long)]
        saved: bool,
    },
    /// Rate a record 0-5 (0 clears)
    Rate { key: String, rating: u8 },
    /// Keep a record in the journal
    Save { key: String },
    /// Delete every matching record
    Delete { key: String },
}

/// Asks on the terminal
struct StdinPrompt;

#[async_trait]
impl SyncPrompt for StdinPrompt {
    async fn confirm(&self, pending_count: usize) -> bool {
        println!(
            "You have {} photo(s) waiting for analysis. Analyze now? [y/N]",
            pending_count
        );
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Ok(Err(e)) => {
                warn!("Failed to read answer: {}", e);
                false
            }
            Err(e) => {
                warn!("Prompt task failed: {}", e);
                false
            }
        }
    }

    async fn show_result(&self, summary: &SyncSummary) {
        println!("{}", summary.message());
    }
}

/// Always confirms (`watch --yes`)
struct AutoConfirm;

#[async_trait]
impl SyncPrompt for AutoConfirm {
    async fn confirm(&self, pending_count: usize) -> bool {
        info!(pending_count, "Auto-confirming sync");
        true
    }

    async fn show_result(&self, summary: &SyncSummary) {
        println!("{}", summary.message());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = match &config_path {
        Some(path) if path.exists() => load_toml_config(path),
        _ => TomlConfig::default(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(url) = &args.server_url {
        config.server.base_url = url.clone();
    }
    if let Some(device_id) = &args.device_id {
        config.identity.device_id = Some(device_id.clone());
    }

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.as_deref())
        .with_config(&config)
        .resolve();
    info!("Root folder: {}", root_folder.display());
    let layout = RootFolderLayout::new(root_folder);

    match args.command {
        Command::Init => init(config, layout, config_path).await,
        command => {
            let ctx = AppContext::open(config, layout)
                .await
                .context("Failed to open TripAI store")?;
            run(&ctx, command).await
        }
    }
}

async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        // Runs before the store is opened
        Command::Init => Ok(()),
        Command::Capture { photo, lat, lng } => capture(ctx, &photo, lat, lng).await,
        Command::Enqueue {
            photo,
            lat,
            lng,
            created_at,
        } => enqueue(ctx, &photo, lat, lng, created_at.as_deref()).await,
        Command::Status => status(ctx).await,
        Command::Sync => sync(ctx).await,
        Command::Watch { yes } => watch(ctx, yes).await,
        Command::Journal(command) => journal(ctx, command).await,
    }
}

async fn init(
    mut config: TomlConfig,
    layout: RootFolderLayout,
    config_path: Option<PathBuf>,
) -> Result<()> {
    match config_path {
        Some(path) if path.exists() => println!("Config exists: {}", path.display()),
        Some(path) => {
            config.root_folder = Some(layout.root().to_path_buf());
            write_toml_config(&config, &path)?;
            println!("Wrote config: {}", path.display());
        }
        None => warn!("No config directory on this platform, skipping config file"),
    }

    let ctx = AppContext::open(config, layout).await?;
    println!("Root folder: {}", ctx.layout.root().display());
    println!("Database: {}", ctx.layout.database_path().display());
    Ok(())
}

async fn capture(ctx: &AppContext, photo: &str, lat: Option<f64>, lng: Option<f64>) -> Result<()> {
    match ctx.capture.analyze_capture(photo, lat, lng).await? {
        CaptureOutcome::Analyzed(record) => {
            println!("{} ({})", record.details.name, record.details.location);
            if !record.details.narrative_p1.is_empty() {
                println!("{}", record.details.narrative_p1);
            }
        }
        CaptureOutcome::Queued(item) => {
            println!("No internet connection. Photo queued for analysis ({}).", item.id);
        }
        CaptureOutcome::Failed(reason) => bail!("Analysis failed: {}", reason),
    }
    Ok(())
}

async fn enqueue(
    ctx: &AppContext,
    photo: &str,
    lat: Option<f64>,
    lng: Option<f64>,
    created_at: Option<&str>,
) -> Result<()> {
    let created_at = match created_at {
        Some(s) => match parse_iso8601(s) {
            Some(ts) => ts,
            None => bail!("Invalid --created-at timestamp: {}", s),
        },
        None => chrono::Utc::now(),
    };

    let item = ctx.queue.enqueue(photo, lat, lng, created_at).await?;
    println!("Queued {} ({} pending)", item.id, ctx.queue.count().await);
    Ok(())
}

async fn status(ctx: &AppContext) -> Result<()> {
    let pending = ctx.queue.count().await;
    let online = ctx.probe.is_online().await;
    println!("Pending analyses: {}", pending);
    println!(
        "Server {}: {}",
        ctx.config.server.base_url,
        if online { "reachable" } else { "unreachable" }
    );
    Ok(())
}

async fn sync(ctx: &AppContext) -> Result<()> {
    if !ctx.queue.has_pending().await {
        println!("Nothing to sync");
        return Ok(());
    }

    let summary = ctx
        .engine
        .sync_all_with_progress(|current, total| println!("Analyzing {} of {}...", current, total))
        .await;
    println!("{}", summary.message());
    Ok(())
}

async fn watch(ctx: &AppContext, auto_confirm: bool) -> Result<()> {
    let interval = Duration::from_secs(ctx.config.connectivity.probe_interval_secs);
    let monitor = Arc::new(ConnectivityMonitor::new(ctx.probe.clone(), interval).await);

    let prompt: Arc<dyn SyncPrompt> = if auto_confirm {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(StdinPrompt)
    };
    let trigger = Arc::new(SyncTrigger::new(
        ctx.queue.clone(),
        ctx.engine.clone(),
        ctx.probe.clone(),
        prompt,
    ));

    let cancel = CancellationToken::new();
    let monitor_task = {
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };
    let trigger_task = {
        let online_rx = monitor.subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move { trigger.run(online_rx, cancel).await })
    };
    let progress_task = {
        let events = ctx.event_bus.subscribe();
        let cancel = cancel.clone();
        tokio::spawn(async move { report_progress(events, cancel).await })
    };

    info!("Watching connectivity, Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutting down");

    cancel.cancel();
    join_background_tasks(vec![
        ("connectivity monitor", monitor_task),
        ("sync trigger", trigger_task),
        ("progress reporter", progress_task),
    ])
    .await;
    Ok(())
}

/// Print drain progress for syncs started by the trigger
async fn report_progress(mut events: broadcast::Receiver<SyncEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SyncEvent::ItemStarted { current, total, .. }) => {
                println!("Analyzing {} of {}...", current, total);
            }
            Ok(SyncEvent::ItemFailed { reason, .. }) => println!("  failed: {}", reason),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Progress reporter fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn journal(ctx: &AppContext, command: JournalCommand) -> Result<()> {
    match command {
        JournalCommand::List { saved } => {
            let records = if saved {
                ctx.journal.saved().await
            } else {
                ctx.journal.all().await
            };
            for record in &records {
                print_record(record);
            }
            println!("{} record(s)", records.len());
        }
        JournalCommand::Rate { key, rating } => {
            let key = RecordKey::parse(&key);
            if !ctx.journal.set_rating(&key, rating).await? {
                bail!("No record for {}", key);
            }
            println!("Rated {} {}/5", key, rating);
        }
        JournalCommand::Save { key } => {
            let key = RecordKey::parse(&key);
            if !ctx.journal.mark_saved(&key).await? {
                bail!("No record for {}", key);
            }
            println!("Saved {}", key);
        }
        JournalCommand::Delete { key } => {
            let key = RecordKey::parse(&key);
            let removed = ctx.journal.delete(&key).await?;
            println!("Deleted {} record(s)", removed);
        }
    }
    Ok(())
}

fn print_record(record: &LandmarkRecord) {
    let name = if record.is_pending() {
        "(pending analysis)"
    } else {
        record.details.name.as_str()
    };
    println!(
        "{:>6}  {}  {:<32}  {}/5  {}  {}",
        record.server_id,
        to_iso8601(&record.created_at),
        name,
        record.rating,
        if record.is_saved { "saved" } else { "-" },
        record.photo_ref,
    );
}
