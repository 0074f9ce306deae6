//! Command-line interface for the data-preparation tools.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{DedupConfig, SplitConfig};
use crate::core::dataset::DatasetOption;
use crate::PrepConfig;

#[derive(Parser)]
#[command(name = "cad-dataprep")]
#[command(about = "Data-preparation tools for CAD datasets", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a train/val/test split manifest from a dataset directory
    Split {
        /// Dataset directory to scan (created if missing)
        root: Option<PathBuf>,
        /// Output JSON manifest
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Shuffle seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,
        /// File extension to collect
        #[arg(long)]
        extension: Option<String>,
    },

    /// Deduplicate the training split by quantized surface hashes
    Dedup {
        /// Data folder path
        #[arg(long)]
        data: PathBuf,
        /// Deduplicate precision in bits
        #[arg(long)]
        bit: Option<u32>,
        /// Dataset option
        #[arg(long, value_enum)]
        option: Option<DatasetOption>,
        /// Enable debug diagnostics
        #[arg(long)]
        debug: bool,
        /// Split file supplying candidate IDs (ABC manifest or DeepCAD split)
        #[arg(long)]
        split_file: Option<PathBuf>,
        /// Directory receiving the output pickle
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Seed for partitioning scanned IDs
        #[arg(long)]
        seed: Option<u64>,
        /// Hash records on a single thread
        #[arg(long)]
        sequential: bool,
    },

    /// Copy the single file of each subfolder into one flat folder
    Flatten {
        /// Directory whose subfolders each hold exactly one file
        source: PathBuf,
        /// Flat destination directory
        destination: PathBuf,
        /// Preview copies without touching the filesystem
        #[arg(long)]
        dry_run: bool,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a bar for counted operations
fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn log_level(verbose: u8, debug: bool) -> log::LevelFilter {
    if debug {
        return log::LevelFilter::Debug;
    }
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}

pub fn run() {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Commands::Dedup { debug: true, .. });

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose, debug))
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PrepConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PrepConfig::default()
            }
        },
        None => PrepConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Split { root, output, seed, extension } => {
            let mut split = config.split.clone();
            if let Some(root) = root {
                split.root = root;
            }
            if let Some(output) = output {
                split.output = output;
            }
            if seed.is_some() {
                split.seed = seed;
            }
            if let Some(extension) = extension {
                split.extension = extension;
            }
            cmd_split(&split);
        }
        Commands::Dedup {
            data,
            bit,
            option,
            debug,
            split_file,
            output_dir,
            seed,
            sequential,
        } => {
            let mut dedup = config.dedup.clone();
            if let Some(bit) = bit {
                dedup.bit = bit;
            }
            if let Some(option) = option {
                dedup.option = option;
            }
            if split_file.is_some() {
                dedup.split_file = split_file;
            }
            if let Some(output_dir) = output_dir {
                dedup.output_dir = output_dir;
            }
            if seed.is_some() {
                dedup.seed = seed;
            }
            if sequential {
                dedup.parallel = false;
            }
            cmd_dedup(&data, &dedup, debug);
        }
        Commands::Flatten { source, destination, dry_run } => {
            cmd_flatten(&source, &destination, dry_run || config.flatten.dry_run);
        }
    }
}

fn cmd_split(config: &SplitConfig) {
    use crate::processors::splitting;

    let start = Instant::now();

    println!("Building dataset split...");
    println!("Root: {}", config.root.display());
    println!("Output: {}", config.output.display());
    match config.seed {
        Some(seed) => println!("Seed: {}", seed),
        None => println!("Seed: none (non-deterministic)"),
    }

    let spinner = create_spinner("Scanning dataset directory...");

    match splitting::create_dataset_split(&config.root, &config.output, config) {
        Ok(manifest) => {
            spinner.finish_and_clear();

            let meta = &manifest.metadata;
            print_summary(
                "Dataset Split Created",
                &[
                    ("Output", config.output.display().to_string()),
                    ("Total folders", meta.total_folders.to_string()),
                    ("Total files", meta.total_files.to_string()),
                    ("Train set", format!("{} files", meta.train_size)),
                    ("Validation set", format!("{} files", meta.val_size)),
                    ("Test set", format!("{} files", meta.test_size)),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Split failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_dedup(data: &Path, config: &DedupConfig, debug: bool) {
    use crate::processors::dedup;

    let start = Instant::now();

    println!("Deduplicating training split...");
    println!("Data folder: {}", data.display());
    println!("Option: {}", config.option);
    println!("Precision: {} bits", config.bit);

    let progress = create_progress_bar("Hashing shapes");

    match dedup::run_dedup(data, config, debug, &progress) {
        Ok(report) => {
            let summary = &report.summary;
            print_summary(
                "Deduplication Complete",
                &[
                    ("Output", report.output.display().to_string()),
                    (
                        "Train kept",
                        format!(
                            "{}/{} ({:.2})",
                            summary.kept,
                            report.train_candidates,
                            summary.unique_ratio()
                        ),
                    ),
                    ("Duplicates dropped", summary.duplicates.to_string()),
                    ("Missing files", summary.not_found.to_string()),
                    ("Malformed records", summary.malformed.to_string()),
                    ("Validation", report.val_size.to_string()),
                    ("Test", report.test_size.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            progress.finish_and_clear();
            error!("Deduplication failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_flatten(source: &Path, destination: &Path, dry_run: bool) {
    use crate::processors::flatten;

    let start = Instant::now();

    if dry_run {
        println!("DRY RUN: No files will be copied");
    }

    let spinner = create_spinner("Copying files...");

    match flatten::flatten_folders(source, destination, dry_run) {
        Ok(copied) => {
            spinner.finish_and_clear();

            print_summary(
                "Flatten Complete",
                &[
                    ("Source", source.display().to_string()),
                    ("Destination", destination.display().to_string()),
                    ("Files copied", copied.len().to_string()),
                    ("Dry run", dry_run.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Flatten failed: {}", e);
            std::process::exit(1);
        }
    }
}
