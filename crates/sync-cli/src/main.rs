//! cookbook-sync CLI
//!
//! Resolves configuration, wires the Subversion and knife collaborators
//! into the sync runner, and maps failures to the stable exit codes.

mod cli;

use clap::Parser;
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use sync_chef::KnifeClient;
use sync_core::{ConfigResolver, SyncOptions, SyncOutcome, SyncRunner};
use sync_vcs::SvnClient;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber was already installed");
    }

    match run(&cli) {
        Ok(SyncOutcome::Completed(report)) => {
            let mode = if report.dry_run { " (dry run)" } else { "" };
            println!(
                "{} revision {} -> {}{}",
                "synchronized".green().bold(),
                report.old_revision,
                report.new_revision,
                mode
            );
            for action in &report.actions {
                println!("  {action}");
            }
        }
        Ok(SyncOutcome::Busy) => {
            println!("Another instance is active; nothing to do.");
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run(cli: &Cli) -> sync_core::Result<SyncOutcome> {
    let mut resolver = ConfigResolver::new();
    if let Some(path) = &cli.config {
        resolver.push_candidate(path.clone());
    }
    let config = resolver.resolve()?;

    let mut svn = SvnClient::new(config.repo_url.clone(), config.working_copy.clone());
    if let Some(binary) = &config.svn_binary {
        svn = svn.with_binary(binary.clone());
    }

    let mut knife = KnifeClient::new(config.working_copy.clone());
    if let Some(knife_config) = &config.knife_config {
        knife = knife.with_config(knife_config.clone());
    }
    if let Some(binary) = &config.knife_binary {
        knife = knife.with_binary(binary.clone());
    }

    let runner = SyncRunner::new(&config, &svn, &knife);
    let options = SyncOptions {
        dry_run: cli.dry_run,
    };

    runner.run_with(&options, |cleanup| {
        // An interruption signal must still run the composed cleanup:
        // exit-trap commands first, then the lock-marker removal.
        let installed = ctrlc::set_handler(move || {
            cleanup.run();
            std::process::exit(130);
        });
        if let Err(err) = installed {
            tracing::warn!(%err, "could not install termination handler");
        }
    })
}
