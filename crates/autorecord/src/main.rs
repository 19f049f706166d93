//! autorecord CLI
//!
//! Runs the host-side mock maintenance tasks outside a test run.
//!
//! Usage:
//!   autorecord [--config autorecord.yaml] <COMMAND>

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use autorecord::reconciler::{audit, prepare_run};
use autorecord::store::{spec_base_name, FixtureStore};
use autorecord::{Config, FsHost, HostTasks};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Automatic HTTP record-and-replay mock maintenance
#[derive(Parser, Debug)]
#[command(name = "autorecord")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML or JSON); defaults apply when omitted
    #[arg(short, long, env = "AUTORECORD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the start-of-run tasks enabled by cleanMocks and forceRecord
    Prepare,
    /// Delete mock indexes (and their fixtures) of specs that no longer exist
    CleanMocks,
    /// Delete every mock index and every external fixture
    RemoveAllMocks,
    /// Report fixture references whose file is missing
    Audit,
    /// Print the tests and mocks stored for a spec
    Show {
        /// Spec file, e.g. cypress/integration/login.spec.js
        spec: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let host = Arc::new(FsHost::new(config.layout()));
    let store = FixtureStore::new(host.clone(), config.autorecord.stringify_options);

    match args.command {
        Command::Prepare => {
            prepare_run(&config.autorecord, &*host).await?;
        }
        Command::CleanMocks => {
            host.clean_mocks().await?;
            println!("{GREEN}Removed mocks of deleted specs{RESET}");
        }
        Command::RemoveAllMocks => {
            host.remove_all_mocks().await?;
            println!("{GREEN}Removed all mocks and fixtures{RESET}");
        }
        Command::Audit => {
            let report = audit(&store).await?;
            println!(
                "{DIM}Checked{RESET} {} specs, {} tests, {} fixture references",
                report.specs, report.tests, report.fixture_refs
            );
            if report.is_clean() {
                println!("{GREEN}No dangling fixture references{RESET}");
            } else {
                for dangling in &report.dangling {
                    println!(
                        "{RED}missing{RESET} {} {DIM}referenced by{RESET} \"{}\" ({})",
                        store.fixture_path(&dangling.fixture_id).display(),
                        dangling.test,
                        dangling.spec
                    );
                }
                anyhow::bail!("{} dangling fixture references", report.dangling.len());
            }
        }
        Command::Show { spec } => {
            let spec_name = spec_base_name(&spec);
            let index = store.read_index(&spec_name).await?;
            println!("{BOLD}{CYAN}{spec_name}{RESET} {DIM}({} tests){RESET}", index.len());
            for (test, records) in index.iter() {
                println!("  {BOLD}{test}{RESET}");
                for record in records {
                    let payload = match record.fixture_id() {
                        Some(id) => format!("{DIM}fixture{RESET} {id}"),
                        None => format!("{DIM}inline{RESET}"),
                    };
                    println!(
                        "    {} {} {} {payload}",
                        record.method, record.url, record.status
                    );
                }
            }
        }
    }

    Ok(())
}
