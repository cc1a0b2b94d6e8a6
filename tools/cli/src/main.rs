//! Lantern CLI - Command line interface for the offline cache and sync queue.
//!
//! This tool drives an offline context from the shell: pre-caching the
//! manifest, routing requests through the cache strategies, queueing
//! mutations and replaying them against the sync endpoint.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

use lantern_app::{default_data_dir, AppConfig, OfflineContext, CONFIG_FILENAME};
use lantern_cache::Routed;
use lantern_common::{ItemKind, Request};
use lantern_sync::SyncOutcome;

#[derive(Parser)]
#[command(name = "lantern")]
#[command(about = "Lantern - Offline resource cache and sync queue")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: <data dir>/lantern/lantern.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Form,
    Analytics,
}

impl From<KindArg> for ItemKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Form => ItemKind::Form,
            KindArg::Analytics => ItemKind::Analytics,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Pre-cache the manifest into the current static namespace.
    Install,

    /// Delete every cache namespace that is not current.
    Activate,

    /// Switch to a new version tag: install, make current, evict the rest.
    Upgrade {
        /// New version tag.
        tag: String,
    },

    /// Route a GET request through the cache strategies.
    Fetch {
        /// URL or origin-relative path.
        target: String,

        /// Treat as a top-level navigation.
        #[arg(short, long)]
        navigate: bool,

        /// Print the response body.
        #[arg(short, long)]
        body: bool,
    },

    /// Queue a mutation for later sync.
    Enqueue {
        /// Item kind.
        #[arg(short, long, value_enum, default_value = "form")]
        kind: KindArg,

        /// JSON payload.
        payload: String,
    },

    /// List pending queue items.
    Queue {
        /// Print items as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Send every pending item to the sync endpoint now.
    Sync,

    /// Show version, cache namespaces and queue length.
    Status,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides the verbosity flag.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_data_dir().join(CONFIG_FILENAME));

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "lantern", &mut std::io::stdout());
            Ok(())
        }

        Commands::Install => cmd_install(&open(&config_path)?).await,

        Commands::Activate => cmd_activate(&open(&config_path)?).await,

        Commands::Upgrade { tag } => cmd_upgrade(&config_path, &tag).await,

        Commands::Fetch {
            target,
            navigate,
            body,
        } => cmd_fetch(&config_path, &target, navigate, body).await,

        Commands::Enqueue { kind, payload } => {
            cmd_enqueue(&open(&config_path)?, kind.into(), &payload).await
        }

        Commands::Queue { json } => cmd_queue(&open(&config_path)?, json).await,

        Commands::Sync => cmd_sync(&open(&config_path)?).await,

        Commands::Status => cmd_status(&open(&config_path)?).await,
    }
}

fn load_config(path: &PathBuf) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    // One-shot commands exit before a deferred attempt could run.
    config.sync.deferred = false;
    Ok(config)
}

fn open(path: &PathBuf) -> Result<OfflineContext> {
    let config = load_config(path)?;
    OfflineContext::open(&config).context("Failed to open offline context")
}

/// Write a default configuration file.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    AppConfig::default()
        .save(path)
        .context("Failed to write configuration")?;

    println!("Configuration written to {}", path.display());
    Ok(())
}

async fn cmd_install(ctx: &OfflineContext) -> Result<()> {
    let report = ctx.install().await.context("Install failed")?;

    println!("Installed into {}", report.namespace);
    println!("  Cached:  {}", report.cached);
    if report.skipped > 0 {
        println!("  Skipped: {} (excluded by cache policy)", report.skipped);
    }
    Ok(())
}

async fn cmd_activate(ctx: &OfflineContext) -> Result<()> {
    let report = ctx.activate().await.context("Activate failed")?;
    print_activation(&report);
    Ok(())
}

async fn cmd_upgrade(config_path: &PathBuf, tag: &str) -> Result<()> {
    let ctx = open(config_path)?;
    info!("Upgrading cache to {}", tag);
    let report = ctx
        .on_version_change(tag)
        .await
        .with_context(|| format!("Failed to switch to version {}", tag))?;

    // Later runs must start at the new version or activate would evict it.
    let version = ctx.version().await;
    AppConfig::save_version(config_path, &version)
        .with_context(|| format!("Failed to record version in {}", config_path.display()))?;

    println!("Now at version {}", version);
    print_activation(&report);
    Ok(())
}

fn print_activation(report: &lantern_cache::ActivateReport) {
    if report.deleted.is_empty() {
        println!("No superseded caches.");
    } else {
        println!("Deleted:");
        for namespace in &report.deleted {
            println!("  {}", namespace);
        }
    }
    for namespace in &report.kept {
        println!("Kept:    {}", namespace);
    }
}

async fn cmd_fetch(config_path: &PathBuf, target: &str, navigate: bool, body: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(_) => config
            .cache
            .resolve(target)
            .with_context(|| format!("Invalid target {}", target))?,
    };
    let ctx = OfflineContext::open(&config).context("Failed to open offline context")?;

    let request = if navigate {
        Request::navigate(url.clone())
    } else {
        Request::get(url.clone())
    };

    let (response, source) = match ctx.route(&request).await {
        Routed::Handled { response, source } => (response, format!("{:?}", source)),
        Routed::Passthrough => {
            let response = ctx
                .fetch_network(&request)
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
            (response, "Passthrough".to_string())
        }
    };

    println!("{} {}", response.status, url);
    println!("  Source: {}", source);
    if let Some(content_type) = response.content_type() {
        println!("  Type:   {}", content_type);
    }
    println!("  Size:   {} bytes", response.body.len());
    if body {
        println!();
        println!("{}", response.text());
    }
    Ok(())
}

async fn cmd_enqueue(ctx: &OfflineContext, kind: ItemKind, payload: &str) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;

    let id = ctx.enqueue(kind, payload).await.context("Failed to queue item")?;

    println!("Queued {} item {}", kind, id);
    Ok(())
}

async fn cmd_queue(ctx: &OfflineContext, json: bool) -> Result<()> {
    let items = ctx.pending().await.context("Failed to read queue")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{} pending item(s):", items.len());
    for item in items {
        println!(
            "  #{:<4} {:<9} {}  {}",
            item.id,
            item.kind.as_str(),
            item.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            item.payload
        );
    }
    Ok(())
}

async fn cmd_sync(ctx: &OfflineContext) -> Result<()> {
    let outcome = ctx.drain_queue().await.context("Sync failed")?;

    match outcome {
        SyncOutcome::Synced { count } => println!("Synced {} item(s).", count),
        other => println!("Sync: {}", other),
    }
    Ok(())
}

async fn cmd_status(ctx: &OfflineContext) -> Result<()> {
    let status = ctx.status().await.context("Failed to read status")?;

    println!("Version: {}", status.version);
    println!("Store:   {}", status.store_backend);
    println!("Queue:   {} pending", status.queue_len);

    if status.namespaces.is_empty() {
        println!("Caches:  none");
    } else {
        println!("Caches:");
        for (namespace, entries) in &status.namespaces {
            let marker = if namespace.version == status.version.as_str() {
                ""
            } else {
                " (superseded)"
            };
            println!("  {:<24} {} entries{}", namespace.identity(), entries, marker);
        }
    }

    if let Some(session) = status.last_sync {
        println!(
            "Last sync: {:?} at {}",
            session.phase,
            session.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
