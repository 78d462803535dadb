mod commands;
mod logging;
mod reporter;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use acl_inventory::config::{self, AppConfig};
use acl_inventory::platform::NativeFs;
use acl_inventory::storage::models::NewFilesystem;
use acl_inventory::storage::{Database, EntitlementStore};
use acl_inventory::{ProgressReporter, ScanService, SilentReporter};
use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use reporter::CliReporter;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let loaded = config::load_configuration();
    let log_config = loaded
        .as_ref()
        .map(|config| config.log.clone())
        .unwrap_or_default();
    let _guard = logging::init_logger(&log_config);

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Run) => run_service(&config),
        Some(Commands::ScanOnce) => run_scan_once(&config),
        Some(Commands::AddFilesystem {
            root,
            depth,
            provider,
            share,
            credentials,
        }) => open_db(&config).and_then(|db| {
            let id = db.add_filesystem(&NewFilesystem {
                drive_root: root.clone(),
                provider,
                share,
                credentials_ref: credentials,
                depth,
            })?;
            info!("Filesystem {} registered (id {}, depth {})", root, id, depth);
            Ok(())
        }),
        Some(Commands::AddExclusion { pattern }) => open_db(&config).and_then(|db| {
            if db.add_exclusion_pattern(&pattern)? {
                info!("Exclusion pattern '{}' added", pattern);
            } else {
                info!("Exclusion pattern '{}' already present", pattern);
            }
            Ok(())
        }),
        Some(Commands::RequestRescan { path }) => open_db(&config).and_then(|db| {
            let id = db.add_rescan_request(&path)?;
            info!("Rescan of {} queued (request {})", path, id);
            Ok(())
        }),
        Some(Commands::ListSubtrees) => list_subtrees(&config),
        Some(Commands::ExportEntitlements { output }) => export_entitlements(&config, &output),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to DELETE all scan results?",
                Some(false),
            ) {
                Ok(true) => open_db(&config).and_then(|db| {
                    db.truncate_scan_results()?;
                    println!("Scan result tables truncated");
                    Ok(())
                }),
                _ => process::exit(0),
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn open_db(config: &AppConfig) -> anyhow::Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))
}

fn run_service(config: &AppConfig) -> anyhow::Result<()> {
    let service = ScanService::new(config.clone());
    let reporter: Arc<dyn ProgressReporter> = Arc::new(SilentReporter);
    let context = service.context(Arc::new(NativeFs), reporter);
    let handle = service.start(context)?;

    let stop = handle.stop_signal();
    ctrlc::set_handler(move || {
        info!("Interrupt received, finishing current work...");
        stop.stop();
    })?;

    info!(
        "Scanning every {}s (full) and {}s (targeted); press Ctrl-C to stop",
        config.full_scan_interval_secs, config.targeted_scan_interval_secs
    );
    handle.wait();
    info!("All scan loops stopped");
    Ok(())
}

fn run_scan_once(config: &AppConfig) -> anyhow::Result<()> {
    let service = ScanService::new(config.clone());
    let reporter: Arc<dyn ProgressReporter> = Arc::new(CliReporter::new());
    let context = service.context(Arc::new(NativeFs), reporter);

    let stop = Arc::clone(&context.stop);
    ctrlc::set_handler(move || stop.stop())?;

    let summary = service.scan_once(context)?;

    println!();
    info!(
        "{} subtrees scanned ({} failed), {} new top-level folders",
        format!("{}", summary.subtrees_scanned).green(),
        format!("{}", summary.subtrees_failed).red(),
        format!("{}", summary.discovered).cyan(),
    );
    info!(
        "{} folders, {} explicit entitlements, {} protected, {} skipped as too long",
        format!("{}", summary.stats.folders).green(),
        format!("{}", summary.stats.entitlements).green(),
        format!("{}", summary.stats.protected).yellow(),
        format!("{}", summary.stats.too_long).yellow(),
    );
    Ok(())
}

fn list_subtrees(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_db(config)?;
    for subtree in db.list_top_level_subtrees()? {
        println!(
            "{:>5}  {:<50}  depth {}  owner {}  last scanned {}{}",
            subtree.id,
            subtree.full_path,
            subtree.scan_depth,
            subtree.data_owner.as_deref().unwrap_or("-"),
            subtree.last_scanned.format("%Y-%m-%d %H:%M:%S"),
            if subtree.is_protected {
                "  (protected)".yellow().to_string()
            } else {
                String::new()
            }
        );
    }
    Ok(())
}

fn export_entitlements(config: &AppConfig, output: &str) -> anyhow::Result<()> {
    let db = open_db(config)?;
    let rows = db.entitlement_report()?;
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {}", output))?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("{} entitlements written to {}", rows.len(), output);
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
