//! Exposes the command line application.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use console::style;
use symsync_service::caching::{CacheEntry, CacheStore};
use symsync_service::config::Config;
use symsync_service::facade::{CrashSyncFacade, SyncOutcome};
use symsync_service::metrics;
use symsync_service::sync::{ArtifactSyncer, LabelResolver};
use symsync_service::types::{CrashInfo, SyncRequest};
use symsync_service::vcs::{SourceControl, create_source_control};

use crate::logging;

/// The platform synced when neither the command line nor the crash names one.
const DEFAULT_PLATFORM: &str = "Win64";

/// Syncs binaries and debug symbols of labeled builds into the local PDB cache.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides the branch substituted into the depot root.
    #[arg(long, global = true, value_name = "NAME")]
    branch_name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Symsync commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Make the artifacts of a build available, using the cache if possible.
    Sync(SyncArgs),

    /// Resolve the label of a build.
    Resolve {
        #[arg(long)]
        changelist: Option<u32>,
        #[arg(long)]
        engine_version: Option<u32>,
    },

    /// Sync a single source file of a build into the client workspace.
    Source {
        #[arg(long)]
        label: String,
        /// Depot path, or path relative to the depot root.
        #[arg(long)]
        file: String,
    },

    /// Clean the PDB cache and report what remains.
    Cleanup,

    /// List cache entries, least recently used first.
    List,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// The build label.
    #[arg(long, conflicts_with_all = ["changelist", "crash"])]
    label: Option<String>,

    /// The changelist the build was made from.
    #[arg(long, conflicts_with = "crash")]
    changelist: Option<u32>,

    /// A crash description in JSON.
    #[arg(long, value_name = "FILE")]
    crash: Option<PathBuf>,

    /// The platform directory below `Binaries`.
    #[arg(long)]
    platform: Option<String>,

    /// Sync only this module, relative to the depot root. Can be repeated.
    #[arg(long = "module", value_name = "PATH")]
    modules: Vec<String>,
}

impl SyncArgs {
    fn request(&self) -> Result<SyncRequest> {
        let mut request = if let Some(path) = &self.crash {
            let file = fs::File::open(path).context("failed to open crash file")?;
            let crash: CrashInfo =
                serde_json::from_reader(file).context("failed to parse crash file")?;
            SyncRequest::from(&crash)
        } else if let Some(label) = &self.label {
            SyncRequest::for_label(label.as_str(), "")
        } else if let Some(changelist) = self.changelist {
            SyncRequest::for_changelist(changelist, "")
        } else {
            bail!("one of --label, --changelist or --crash is required");
        };

        if let Some(platform) = &self.platform {
            request.platform = platform.clone();
        } else if request.platform.is_empty() {
            request.platform = DEFAULT_PLATFORM.into();
        }
        if !self.modules.is_empty() {
            request.modules = self.modules.clone();
        }
        Ok(request)
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::get(cli.config()).context("failed loading config")?;
    if let Some(branch) = &cli.branch_name {
        config.source_control.branch = branch.clone();
    }

    let dsn = config
        .sentry_dsn
        .as_deref()
        .map(str::parse::<sentry::types::Dsn>)
        .transpose()
        .context("invalid sentry DSN")?;
    let _sentry = sentry::init(sentry::ClientOptions {
        dsn,
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No other threads have been spawned yet.
    unsafe { logging::init_logging(&config) };
    if let Some(statsd) = &config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    match cli.command {
        Command::Sync(args) => sync(&config, &args),
        Command::Resolve {
            changelist,
            engine_version,
        } => resolve(&config, engine_version, changelist),
        Command::Source { label, file } => source(&config, &label, &file),
        Command::Cleanup => cleanup(&config),
        Command::List => list(&config),
    }
}

fn source_control(config: &Config) -> Result<Arc<dyn SourceControl>> {
    let backend = config
        .source_control
        .backend
        .as_ref()
        .context("no source control backend configured")?;
    Ok(create_source_control(backend))
}

fn sync(config: &Config, args: &SyncArgs) -> Result<()> {
    let request = args.request()?;
    let facade = CrashSyncFacade::new(config, source_control(config)?);
    let outcome = facade.sync(&request).context("failed to sync build")?;

    let status = match &outcome {
        SyncOutcome::Cached(_) => style("cached").green(),
        SyncOutcome::Fresh(_) => style("synced").cyan(),
        SyncOutcome::Uncached(_) => style("synced (not cached)").yellow(),
    };
    println!(
        "{} {} files in {}",
        status,
        outcome.files().len(),
        outcome.root().display()
    );
    for file in outcome.files() {
        println!("  {}", file.display());
    }
    Ok(())
}

fn resolve(config: &Config, engine_version: Option<u32>, changelist: Option<u32>) -> Result<()> {
    let resolver = LabelResolver::new(
        Arc::new(config.source_control.clone()),
        source_control(config)?,
    );
    match resolver.resolve(engine_version, changelist) {
        Some(label) => {
            println!("{label}");
            Ok(())
        }
        None => bail!("no label found"),
    }
}

fn source(config: &Config, label: &str, file: &str) -> Result<()> {
    let syncer = ArtifactSyncer::new(
        Arc::new(config.source_control.clone()),
        source_control(config)?,
    );
    let local = syncer
        .sync_source_file(label, file)
        .context("failed to sync source file")?;
    println!("{}", local.display());
    Ok(())
}

fn cleanup(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    println!(
        "{} entries occupying {} GB remain",
        cache.len(),
        cache.total_size_gb()
    );
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    for entry in cache.entries() {
        print_entry(entry);
    }
    Ok(())
}

/// Initializes the cache, which runs its cleanup.
fn open_cache(config: &Config) -> Result<CacheStore> {
    let cache = CacheStore::init(config.pdb_cache.clone());
    if !cache.is_enabled() {
        bail!("the PDB cache is disabled");
    }
    Ok(cache)
}

fn print_entry(entry: &CacheEntry) {
    let last_access: DateTime<Local> = entry.last_access().into();
    println!(
        "{:>4} GB  {}  {} ({} files)",
        entry.size_gb(),
        style(last_access.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(entry.label()).bold(),
        entry.files().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync() {
        let cli = Cli::parse_from([
            "symsync",
            "--branch-name",
            "UE4-Releases/4.2",
            "sync",
            "--changelist",
            "2082666",
            "--module",
            "Engine/Binaries/Win64/Core.dll",
        ]);
        assert_eq!(cli.branch_name.as_deref(), Some("UE4-Releases/4.2"));

        let Command::Sync(args) = cli.command else {
            panic!("expected the sync command");
        };
        let request = args.request().unwrap();
        assert_eq!(request.changelist, Some(2082666));
        assert_eq!(request.platform, DEFAULT_PLATFORM);
        assert_eq!(request.modules, ["Engine/Binaries/Win64/Core.dll"]);
    }

    #[test]
    fn test_sync_conflicting_builds() {
        let result = Cli::try_parse_from([
            "symsync",
            "sync",
            "--label",
            "UE4_CL-1",
            "--changelist",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_requires_build() {
        let cli = Cli::parse_from(["symsync", "sync", "--platform", "Linux"]);
        let Command::Sync(args) = cli.command else {
            panic!("expected the sync command");
        };
        assert!(args.request().is_err());
    }
}
