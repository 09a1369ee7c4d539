//! `catalog`: maintenance commands for the driver catalog.
//!
//! # Usage
//!
//! ```bash
//! catalog scan drivers/
//! catalog rewrite drivers/ --license MIT --chips all --fw all
//! catalog clean-backups drivers/
//! catalog rename-readme drivers/ --dry-run
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use catalog_tools::{RewriteDefaults, clean_backups, rename_markdown, render_scan, rewrite_all, scan_packages};

#[derive(Parser)]
#[command(name = "catalog")]
#[command(about = "Audit and normalize driver package metadata")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report every package.json with missing fields and malformed urls
    Scan {
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Rewrite every package.json into the normalized layout
    Rewrite {
        #[arg(default_value = ".")]
        root: PathBuf,

        #[arg(long, default_value = "MIT")]
        license: String,

        #[arg(long, default_value = "all")]
        chips: String,

        #[arg(long, default_value = "all")]
        fw: String,
    },
    /// Delete leftover package.json.bak files
    CleanBackups {
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Rename markdown files to README.md, README_1.md, ...
    RenameReadme {
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Print the plan without renaming anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse().command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when the command ran but some files failed.
fn run(command: Command) -> catalog_tools::Result<bool> {
    match command {
        Command::Scan { root } => {
            let packages = scan_packages(&root)?;
            print!("{}", render_scan(&root, &packages));
            Ok(packages.iter().all(|p| p.error.is_none()))
        }
        Command::Rewrite {
            root,
            license,
            chips,
            fw,
        } => {
            let defaults = RewriteDefaults { license, chips, fw };
            let summary = rewrite_all(&root, &defaults)?;
            println!(
                "{} package.json files: {} rewritten, {} failed; {} backups removed",
                summary.total,
                summary.succeeded,
                summary.failed.len(),
                summary.backups.removed
            );
            for e in summary.failed.iter().chain(&summary.backups.failed) {
                println!("  failed: {e}");
            }
            Ok(summary.failed.is_empty() && summary.backups.failed.is_empty())
        }
        Command::CleanBackups { root } => {
            let summary = clean_backups(&root)?;
            println!("{} backups removed, {} failed", summary.removed, summary.failed.len());
            for e in &summary.failed {
                println!("  failed: {e}");
            }
            Ok(summary.failed.is_empty())
        }
        Command::RenameReadme { root, dry_run } => {
            let summary = rename_markdown(&root, dry_run)?;
            let verb = if dry_run { "would rename" } else { "renamed" };
            for (from, to) in &summary.renamed {
                println!("{verb} {} -> {}", from.display(), to.display());
            }
            println!(
                "{} markdown files: {} {verb}, {} already named, {} failed",
                summary.found,
                summary.renamed.len(),
                summary.unchanged,
                summary.failed.len()
            );
            for e in &summary.failed {
                println!("  failed: {e}");
            }
            Ok(summary.failed.is_empty())
        }
    }
}
