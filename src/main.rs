//! DiskTally — incremental disk usage tally.
//!
//! Thin binary entry point. All engine logic lives in `disktally-core`.
//!
//! Usage:
//!   disktally scan <PATH>         Scan (or rescan) a folder tree
//!   disktally show [PATH]         Print stored results
//!   disktally export <OUT.csv>    Export stored results as CSV

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use disktally_core::model::{resolve_path, ByteSize};
use disktally_core::scanner::progress::ScanProgress;
use disktally_core::{EngineConfig, FolderNode, ResultStore, ScanActivity, ScanEngine};

/// How often `scan` polls the engine for faults and progress.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "disktally",
    version,
    about = "Incremental disk usage tally with resumable scans"
)]
struct Cli {
    /// Result store document
    #[arg(long, global = true, default_value = "disktally-results.json")]
    store: PathBuf,

    /// Engine config (JSON); missing fields use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a folder tree, reusing stored results where possible
    Scan {
        /// Folder to scan
        path: PathBuf,
    },

    /// Show stored results for a folder and its direct children
    Show {
        /// Folder to show (defaults to every stored root)
        path: Option<PathBuf>,

        /// Number of children to list per folder
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Export every stored folder as CSV
    Export {
        /// Output file
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(ResultStore::load(&cli.store));

    match cli.command {
        Command::Scan { path } => {
            let config = load_config(cli.config.as_deref())?;
            run_scan(&path, store, config)
        }
        Command::Show { path, top } => show(&store, path.as_deref(), top),
        Command::Export { output } => {
            let file = fs::File::create(&output)
                .with_context(|| format!("cannot create {}", output.display()))?;
            let rows = disktally_core::report::write_csv(&store, file)?;
            info!("Wrote {rows} row(s) to {}", output.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn run_scan(path: &Path, store: Arc<ResultStore>, config: EngineConfig) -> Result<()> {
    let mut engine = ScanEngine::start(path, store, config)
        .with_context(|| format!("cannot scan {}", path.display()))?;

    loop {
        std::thread::sleep(POLL_INTERVAL);

        for event in engine.progress().try_iter() {
            match event {
                ScanProgress::Activity(activity) => info!("{activity}"),
                ScanProgress::Update {
                    files_scanned,
                    folders_scanned,
                    errors,
                    current_path,
                } => info!(
                    "{folders_scanned} folders, {files_scanned} files, {errors} skipped: {}",
                    current_path.display()
                ),
                ScanProgress::Checkpoint { duration } => info!("Checkpoint saved in {duration:?}"),
                ScanProgress::Complete { .. } | ScanProgress::Cancelled => {}
                ScanProgress::Failed { message } => warn!("{message}"),
            }
        }

        if let Err(fault) = engine.check_health() {
            engine.dispose();
            bail!(fault);
        }
        if engine.is_finished() {
            break;
        }
    }
    engine.wait();
    engine.check_health()?;

    if engine.activity() != ScanActivity::ScanComplete {
        bail!("scan of {} did not complete", path.display());
    }
    print_folder(engine.root(), 20);
    Ok(())
}

fn show(store: &ResultStore, path: Option<&Path>, top: usize) -> Result<()> {
    match path {
        Some(path) => {
            let absolute = resolve_path(path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            let Some(node) = store.find(&absolute) else {
                bail!("no stored results for {}", absolute.display());
            };
            print_folder(&node, top);
        }
        None => {
            let roots = store.roots();
            if roots.is_empty() {
                println!("No stored results.");
            }
            for root in &roots {
                print_folder(root, top);
                println!();
            }
        }
    }
    Ok(())
}

fn print_folder(node: &FolderNode, top: usize) {
    let summary = node.summary();
    let agg = summary.aggregate;
    let scanned = summary
        .last_scan
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".into());

    println!("{}", summary.path.display());
    println!(
        "  {}  {} files  {} folders  last scanned {scanned}",
        ByteSize(agg.size),
        agg.files,
        agg.subfolders
    );
    if let Some(volume) = node.volume() {
        println!(
            "  volume: {} used of {} ({:.1}%)",
            ByteSize(volume.used_bytes()),
            ByteSize(volume.total_bytes),
            volume.usage_percent()
        );
    }

    let children = node.children_sorted_by_size();
    for child in children.iter().take(top) {
        let child_agg = child.aggregate();
        println!(
            "  {:>10}  {:>5.1}%  {}",
            ByteSize(child_agg.size).to_string(),
            ByteSize(child_agg.size).percent_of(agg.size),
            child.name()
        );
    }
    if children.len() > top {
        println!("  … {} more", children.len() - top);
    }
}
