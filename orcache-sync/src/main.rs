//! orcache-sync - registry cache rebuild tool
//!
//! Rebuilds the institution-scoped publication, grant and profile caches
//! synchronously, one run log entry per institution and target.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use orcache_common::config::{load_config, resolve_config_path, TomlConfig};
use orcache_common::db::{init_database, CacheTarget};
use orcache_sync::{CacheRebuilder, RunOutcome};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used until the configuration has been read
const STARTUP_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Command-line arguments for orcache-sync
#[derive(Parser, Debug)]
#[command(name = "orcache-sync")]
#[command(about = "Rebuild the local registry cache")]
#[command(version)]
struct Args {
    /// Configuration file (falls back to ORCACHE_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Purge and rebuild cached publications and/or grants
    Rebuild {
        /// Institution id; every registered institution when omitted
        #[arg(short, long)]
        institution: Option<String>,

        #[arg(short, long, value_enum, default_value_t = RebuildTarget::Both)]
        target: RebuildTarget,
    },
    /// Refresh name summaries of already cached persons
    SyncProfiles {
        /// Institution id; every registered institution when omitted
        #[arg(short, long)]
        institution: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RebuildTarget {
    #[value(alias = "works")]
    Publications,
    #[value(alias = "fundings")]
    Grants,
    Both,
    Profiles,
    All,
}

impl RebuildTarget {
    fn cache_targets(self) -> &'static [CacheTarget] {
        match self {
            RebuildTarget::Publications => &[CacheTarget::Publications],
            RebuildTarget::Grants => &[CacheTarget::Grants],
            RebuildTarget::Both => &[CacheTarget::Publications, CacheTarget::Grants],
            RebuildTarget::Profiles => &[CacheTarget::Profiles],
            RebuildTarget::All => &[
                CacheTarget::Publications,
                CacheTarget::Grants,
                CacheTarget::Profiles,
            ],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing before config loading so its messages are kept
    let (filter, filter_handle) = filter_layer();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_startup_config(args.config.as_deref(), &filter_handle)?;

    info!("Starting orcache-sync {}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let rebuilder =
        CacheRebuilder::from_config(pool, &config).context("Invalid registry configuration")?;

    let (institution, targets) = match args.command {
        Command::Rebuild {
            institution,
            target,
        } => (institution, target.cache_targets()),
        Command::SyncProfiles { institution } => (institution, RebuildTarget::Profiles.cache_targets()),
    };

    let outcomes = match institution {
        Some(institution) => {
            let mut outcomes = Vec::with_capacity(targets.len());
            for &target in targets {
                outcomes.push(rebuilder.run_logged(&institution, target).await?);
            }
            outcomes
        }
        None => rebuilder.rebuild_all(targets).await?,
    };

    report(&outcomes);

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} run(s) failed", failed, outcomes.len());
    }

    info!("Cache rebuild completed");
    Ok(())
}

/// Reloadable filter: `RUST_LOG` if set, else the startup level
fn filter_layer() -> (reload::Layer<EnvFilter, Registry>, FilterHandle) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| STARTUP_LOG_LEVEL.into());
    reload::Layer::new(filter)
}

/// Filter for the configured `logging.level`; `None` when `RUST_LOG` decides
fn configured_filter(level: &str, env_filter_set: bool) -> Option<EnvFilter> {
    if env_filter_set {
        return None;
    }
    match EnvFilter::try_new(level) {
        Ok(filter) => Some(filter),
        Err(e) => {
            warn!(level = %level, error = %e, "Invalid logging.level, keeping {}", STARTUP_LOG_LEVEL);
            None
        }
    }
}

/// Load the configuration, then switch logging to its level
fn load_startup_config(cli_path: Option<&Path>, filter_handle: &FilterHandle) -> Result<TomlConfig> {
    let config_path = resolve_config_path(cli_path);
    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;

    let env_filter_set = std::env::var_os(EnvFilter::DEFAULT_ENV).is_some();
    if let Some(filter) = configured_filter(&config.logging.level, env_filter_set) {
        if let Err(e) = filter_handle.reload(filter) {
            warn!(error = %e, "Could not apply logging.level");
        }
    }

    Ok(config)
}

fn report(outcomes: &[RunOutcome]) {
    for outcome in outcomes {
        match &outcome.error {
            None => info!(
                "[{}] {}: {} rows",
                outcome.institution, outcome.target, outcome.row_count
            ),
            Some(error) => info!(
                "[{}] {}: FAILED ({})",
                outcome.institution, outcome.target, error
            ),
        }
    }
}
