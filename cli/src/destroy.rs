use anyhow::Result;
use clap::Parser;
use k8s_harness::{ClusterOrchestrator, ProcessRunner};

/// The destroy subcommand removes every node of a cluster created by an earlier `run`.
#[derive(Debug, Parser)]
pub(crate) struct Destroy {}

impl Destroy {
    pub(crate) async fn run(
        self,
        mut orchestrator: ClusterOrchestrator<ProcessRunner>,
    ) -> Result<()> {
        // A failed destroy keeps the cluster record, so this can simply be run again.
        orchestrator.destroy_existing().await?;
        println!("The cluster was successfully destroyed.");
        Ok(())
    }
}
