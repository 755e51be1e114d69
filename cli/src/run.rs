use anyhow::Result;
use clap::Parser;
use k8s_harness::driver;
use k8s_harness::{ClusterOrchestrator, HarnessFile, ProcessRunner, RunOptions};
use std::path::{Path, PathBuf};

/// The run subcommand creates a cluster, runs the test bench in `.k8sharness` and destroys the
/// cluster afterwards.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// Path to the test bench file. Defaults to `.k8sharness` in the working directory.
    #[clap(long = "harness-file")]
    harness_file: Option<PathBuf>,

    /// Keep the cluster up after the test bench finishes. Remove it later with `destroy`.
    #[clap(long = "disable-teardown")]
    disable_teardown: bool,
}

impl Run {
    pub(crate) async fn run(
        self,
        base_dir: &Path,
        mut orchestrator: ClusterOrchestrator<ProcessRunner>,
    ) -> Result<()> {
        let options = RunOptions {
            harness_file: self
                .harness_file
                .unwrap_or_else(|| HarnessFile::default_path(base_dir)),
            disable_teardown: self.disable_teardown,
        };
        let phases = ProcessRunner::new(orchestrator.settings().test_timeout);
        driver::run(&mut orchestrator, &phases, &options).await?;
        println!("Your test bench passed.");
        Ok(())
    }
}
