/*!

This is the command line interface for creating a disposable Kubernetes cluster, running a test
bench against it and tearing it down again.

!*/

mod destroy;
mod run;
mod validate;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use k8s_harness::{ClusterOrchestrator, ProcessRunner, Settings};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

/// Runs a test bench against a disposable multi-node Kubernetes cluster.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    /// The project directory holding `.k8sharness`. Defaults to the current directory.
    #[clap(long = "working-dir")]
    working_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Create a cluster, run the test bench against it and destroy it.
    Run(run::Run),
    /// Check a test bench file and print the commands it would run.
    Validate(validate::Validate),
    /// Destroy a cluster left behind by an earlier run.
    Destroy(destroy::Destroy),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let base_dir = match args.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Unable to determine the current directory")?,
    };
    match args.command {
        Command::Validate(validate) => validate.run(&base_dir),
        Command::Run(run) => run.run(&base_dir, orchestrator(&base_dir)?).await,
        Command::Destroy(destroy) => destroy.run(orchestrator(&base_dir)?).await,
    }
}

fn orchestrator(base_dir: &std::path::Path) -> Result<ClusterOrchestrator<ProcessRunner>> {
    let settings = Settings::from_env(base_dir).context("Unable to read harness settings")?;
    let runner = Arc::new(ProcessRunner::new(settings.command_timeout));
    Ok(ClusterOrchestrator::new(runner, settings))
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate and the library.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("k8s_harness"), level)
                .init();
        }
    }
}
