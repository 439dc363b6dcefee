use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use fleet_cache::CacheStore;
use fleet_inventory::{
    FleetInventory, InventoryConfig, ResourceKind, Scope, ScopeOverrides, MAX_CONCURRENCY,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    print_stdout(&text)
}

#[derive(Parser)]
#[command(name = "fleet-report")]
#[command(about = "GPU fleet inventory joined across the cloud and the cluster", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Compartment to inventory (env: OCI_COMPARTMENT_ID, falls back to the tenancy)
    #[arg(long, global = true)]
    compartment_id: Option<String>,

    /// Region (env: OCI_REGION, or the OCI config profile)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Tenancy used for announcements (env: OCI_TENANCY_ID)
    #[arg(long, global = true)]
    tenancy_id: Option<String>,

    /// OCI CLI config profile (env: OCI_CLI_PROFILE, default: DEFAULT)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// OCI CLI config file (default: ~/.oci/config)
    #[arg(long, global = true, env = "OCI_CLI_CONFIG_FILE")]
    oci_config: Option<PathBuf>,

    /// Cache directory (env: FLEET_INVENTORY_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Cache TTL in seconds (env: FLEET_INVENTORY_CACHE_TTL_SECS, default: 3600)
    #[arg(long, global = true)]
    cache_ttl_seconds: Option<u64>,

    /// Parallel detail calls (env: FLEET_INVENTORY_CONCURRENCY, default: 8)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Timeout per remote call in seconds (env: FLEET_INVENTORY_CALL_TIMEOUT_SECS, default: 60)
    #[arg(long, global = true)]
    timeout_seconds: Option<u64>,

    /// `oci` executable
    #[arg(long, global = true, env = "FLEET_INVENTORY_OCI_BIN")]
    oci_bin: Option<PathBuf>,

    /// `kubectl` executable
    #[arg(long, global = true, env = "FLEET_INVENTORY_KUBECTL_BIN")]
    kubectl_bin: Option<PathBuf>,

    /// Node label selector
    #[arg(long, global = true)]
    node_selector: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch (or reuse cached) collections, join them and print the inventory
    Report(ReportArgs),

    /// Drop cached collections so the next report refetches them
    Invalidate(InvalidateArgs),

    /// Remove every entry from the cache directory
    #[command(name = "clear-cache")]
    ClearCache,
}

#[derive(Args, Default)]
struct ReportArgs {
    /// Ignore cache freshness and refetch everything
    #[arg(long)]
    refresh: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct InvalidateArgs {
    /// Resource kinds, e.g. fabrics gpu-memory-clusters nodes
    #[arg(required_unless_present = "cluster_change")]
    resources: Vec<ResourceKind>,

    /// Drop what a cluster create/update/delete makes stale
    #[arg(long, conflicts_with = "resources")]
    cluster_change: bool,
}

#[derive(Serialize)]
struct Removed {
    removed: usize,
}

impl Cli {
    fn inventory_config(&self) -> InventoryConfig {
        let mut config = InventoryConfig::from_env();
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(secs) = self.cache_ttl_seconds {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(limit) = self.concurrency {
            config.concurrency = limit.clamp(1, MAX_CONCURRENCY);
        }
        if let Some(secs) = self.timeout_seconds.filter(|s| *s > 0) {
            config.call_timeout = Duration::from_secs(secs);
        }
        if let Some(bin) = &self.oci_bin {
            config.oci_bin = bin.clone();
        }
        if let Some(bin) = &self.kubectl_bin {
            config.kubectl_bin = bin.clone();
        }
        if let Some(selector) = &self.node_selector {
            config.node_selector = selector.clone();
        }
        config
    }

    fn scope(&self) -> Result<Scope> {
        ScopeOverrides {
            compartment_id: self.compartment_id.clone(),
            region: self.region.clone(),
            tenancy_id: self.tenancy_id.clone(),
            profile: self.profile.clone(),
            oci_config_file: self.oci_config.clone(),
        }
        .resolve()
        .context("Cannot resolve account scope")
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = cli.inventory_config();
    match &cli.command {
        None => run_report(&cli, config, &ReportArgs::default()).await,
        Some(Commands::Report(args)) => run_report(&cli, config, args).await,
        Some(Commands::Invalidate(args)) => run_invalidate(&cli, config, args).await,
        Some(Commands::ClearCache) => run_clear_cache(config).await,
    }
}

async fn run_report(cli: &Cli, config: InventoryConfig, args: &ReportArgs) -> Result<()> {
    let scope = cli.scope()?;
    let inventory = FleetInventory::with_cli(&config, scope)
        .context("Cannot start inventory")?
        .force_refresh(args.refresh);
    let report = inventory.report().await;
    print_json(&report, args.pretty)
}

async fn run_invalidate(cli: &Cli, config: InventoryConfig, args: &InvalidateArgs) -> Result<()> {
    let scope = cli.scope()?;
    let inventory = FleetInventory::with_cli(&config, scope).context("Cannot start inventory")?;
    let result = if args.cluster_change {
        inventory.invalidate_after_cluster_change().await
    } else {
        inventory.invalidate_kinds(&args.resources).await
    };
    let removed = result.context("Cannot invalidate cache entries")?;
    print_json(&Removed { removed }, false)
}

async fn run_clear_cache(config: InventoryConfig) -> Result<()> {
    let store = CacheStore::new(&config.cache_dir, config.cache_ttl);
    let removed = store
        .clear()
        .await
        .with_context(|| format!("Cannot clear {}", config.cache_dir.display()))?;
    log::info!("Removed {removed} entries from {}", config.cache_dir.display());
    print_json(&Removed { removed }, false)
}
