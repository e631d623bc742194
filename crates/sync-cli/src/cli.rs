//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::Parser;

/// Synchronize a version-controlled Chef repository to the Chef server
#[derive(Parser, Debug)]
#[command(name = "cookbook-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose (debug) output
    #[arg(short, long)]
    pub verbose: bool,

    /// Compute and log the change set without uploading, deleting, or
    /// advancing the checkpoint
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Additional configuration file, applied with highest precedence
    #[arg(short, long, env = "COOKBOOK_SYNC_CONFIG")]
    pub config: Option<PathBuf>,
}
