//! Shorts pipeline command line entry point.
//!
//! Usage:
//!   shorts-pipeline                  # same as `run`
//!   shorts-pipeline run --reset
//!   shorts-pipeline status --json
//!   shorts-pipeline sources add <url>...

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use directories::BaseDirs;

use shorts_core::collaborators;
use shorts_core::config::ConfigManager;
use shorts_core::dedup::{DedupTracker, Namespace};
use shorts_core::logging::{init_tracing, LogConfig, LogLevel, RunLogger};
use shorts_core::models::StageId;
use shorts_core::orchestrator::{new_run_id, Context, Controller, RunSummary};
use shorts_core::sources::{SourceList, SourceRules};
use shorts_core::status::StatusStore;
use shorts_core::workspace::{discover_items, WorkspaceLayout, WorkspaceReset};

/// Config file name looked up in the working directory.
const LOCAL_CONFIG: &str = "shorts.toml";

#[derive(Parser, Debug)]
#[command(name = "shorts-pipeline")]
#[command(about = "Acquire, transform, enrich, and publish short-form videos")]
#[command(version)]
struct Cli {
    /// Config file (default: ./shorts.toml, then the user config directory)
    #[arg(short, long, global = true, env = "SHORTS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all four stages once
    Run {
        /// Clear the stage directories before ingest
        #[arg(long)]
        reset: bool,
        /// Start even if the status record shows a run in progress
        #[arg(long)]
        force: bool,
    },
    /// Show the status record, dedup counts, and directory contents
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Set every stage back to pending
    ResetStatus,
    /// Clear the stage directories
    Reset {
        /// Also forget every acquired and published fingerprint
        #[arg(long)]
        dedup: bool,
        /// Reset even if the status record shows a run in progress
        #[arg(long)]
        force: bool,
    },
    /// Inspect or extend the source list
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Write the default config file
    Init,
}

#[derive(Subcommand, Debug)]
enum SourcesAction {
    /// Validate every line of the source list
    Check,
    /// Append URLs (cleaned, validated, deduplicated)
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Command::Run {
        reset: false,
        force: false,
    });

    let mut config = ConfigManager::new(resolve_config_path(cli.config.as_deref()));
    if !matches!(command, Command::Init) {
        config
            .load_or_default()
            .with_context(|| format!("loading {}", config.path().display()))?;
    }
    init_tracing(cli.log_level.unwrap_or(config.settings().logging.level));
    tracing::debug!("Using config {}", config.path().display());

    match command {
        Command::Run { reset, force } => run(&mut config, reset, force),
        Command::Status { json } => show_status(&config, json),
        Command::ResetStatus => {
            StatusStore::new(config.status_file()).reset_status()?;
            println!("Status reset");
            Ok(())
        }
        Command::Reset { dedup, force } => reset_workspace(&config, dedup, force),
        Command::Sources { action } => sources(&config, action),
        Command::Init => init_config(&mut config),
    }
}

/// `--config`, else `./shorts.toml`, else the per-user config directory.
fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return local;
    }
    match BaseDirs::new() {
        Some(dirs) => dirs
            .config_dir()
            .join("shorts-pipeline")
            .join("settings.toml"),
        None => local,
    }
}

fn init_config(config: &mut ConfigManager) -> Result<()> {
    let created = config
        .load_or_create()
        .with_context(|| format!("writing {}", config.path().display()))?;
    if created {
        println!("Wrote default config to {}", config.path().display());
    } else {
        println!("Config already exists at {}", config.path().display());
    }
    Ok(())
}

fn run(config: &mut ConfigManager, reset: bool, force: bool) -> Result<()> {
    if reset {
        config.settings_mut().pipeline.reset_on_start = true;
    }
    config.ensure_dirs_exist()?;
    let settings = config.settings().clone();

    let controller = Controller::new(
        collaborators::production(&settings),
        StatusStore::new(config.status_file()),
        DedupTracker::new(config.state_dir()),
    );
    if !force {
        controller.check_idle()?;
    }

    let rules = SourceRules::from(&settings.sources);
    let list = SourceList::load(&config.sources_file(), &rules)
        .with_context(|| format!("reading {}", config.sources_file().display()))?;
    for rejected in &list.rejected {
        tracing::warn!(
            "Ignoring source line {} ({}): {}",
            rejected.line,
            rejected.text,
            rejected.reason
        );
    }

    let run_id = new_run_id();
    let logger = RunLogger::new(&run_id, config.logs_folder(), LogConfig::from(&settings.logging))
        .with_context(|| format!("creating run log in {}", config.logs_folder().display()))?;
    let layout = WorkspaceLayout::new(config.workspace_root());
    let ctx = Context::new(run_id, settings, layout, Arc::new(logger));

    let summary = controller.run(&ctx, list.sources)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run {} finished: {}", summary.run_id, summary.outcome);
    for stage in &summary.stages {
        println!("  {:<10} {}", stage.stage.label(), stage.message());
    }
    if let Some(halted) = &summary.halted {
        println!("  halted at {}: {}", halted.stage.label(), halted.message);
    }
}

fn show_status(config: &ConfigManager, json: bool) -> Result<()> {
    let record = StatusStore::new(config.status_file()).read()?;
    let dedup = DedupTracker::new(config.state_dir());
    let layout = WorkspaceLayout::new(config.workspace_root());

    let dirs = [
        ("raw", layout.raw()),
        ("final", layout.final_dir()),
        ("ready", layout.ready()),
        ("uploaded", layout.uploaded()),
    ];
    let mut counts = Vec::new();
    for (name, dir) in &dirs {
        counts.push((*name, discover_items(dir)?.len()));
    }

    if json {
        let mut directories = serde_json::Map::new();
        for (name, count) in &counts {
            directories.insert(name.to_string(), serde_json::json!(count));
        }
        let view = serde_json::json!({
            "status": record,
            "dedup": {
                "acquired": dedup.count(Namespace::Acquired),
                "published": dedup.count(Namespace::Published),
            },
            "directories": directories,
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let run_id = record.run.run_id.as_deref().unwrap_or("-");
    println!(
        "Run {} | running: {} | outcome: {}",
        run_id, record.run.running, record.run.outcome
    );
    if let Some(stage) = record.run.current_stage {
        println!("Current stage: {}", stage.label());
    }
    for stage in StageId::ALL {
        let rec = record.stage(stage);
        println!(
            "  {:<10} {:<8} {} {}",
            stage.label(),
            rec.state,
            rec.item_count,
            rec.message
        );
    }
    println!(
        "Dedup: {} acquired, {} published",
        dedup.count(Namespace::Acquired),
        dedup.count(Namespace::Published)
    );
    for (name, count) in counts {
        println!("  {:<9} {} item(s)", name, count);
    }
    Ok(())
}

fn reset_workspace(config: &ConfigManager, clear_dedup: bool, force: bool) -> Result<()> {
    let status = StatusStore::new(config.status_file());
    if force {
        status.reset_status()?;
    }
    let dedup = DedupTracker::new(config.state_dir());
    let layout = WorkspaceLayout::new(config.workspace_root());

    let report = WorkspaceReset::new(&layout, &status, &dedup).reset(clear_dedup)?;
    println!(
        "Removed {} entries; cleared {} dedup namespace(s)",
        report.removed_entries,
        report.cleared_namespaces.len()
    );
    Ok(())
}

fn sources(config: &ConfigManager, action: SourcesAction) -> Result<()> {
    let rules = SourceRules::from(&config.settings().sources);
    let path = config.sources_file();

    match action {
        SourcesAction::Check => {
            let list = SourceList::load(&path, &rules)?;
            println!("{}: {} valid source(s)", path.display(), list.sources.len());
            for rejected in &list.rejected {
                println!("  line {}: {} ({})", rejected.line, rejected.text, rejected.reason);
            }
        }
        SourcesAction::Add { urls } => {
            let (added, rejected) = SourceList::append(&path, &urls, &rules)?;
            for source in &added {
                println!("Added {} ({})", source.url, source.id);
            }
            for (url, reason) in &rejected {
                println!("Rejected {}: {}", url, reason);
            }
            if added.is_empty() && rejected.is_empty() {
                println!("Nothing new to add");
            }
        }
    }
    Ok(())
}
