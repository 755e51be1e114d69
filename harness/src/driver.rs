//! The `run` lifecycle: validate, create, provision, run the test bench, destroy.

use crate::cluster_info::ClusterInfo;
use crate::error::Result;
use crate::harness_file::{HarnessFile, TestRunner};
use crate::metadata::CLUSTER_DESCRIPTOR_FILENAME;
use crate::orchestrator::{ClusterOrchestrator, ClusterState};
use crate::process::CommandRunner;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub harness_file: PathBuf,
    /// Leave the cluster up after the test bench finishes, for inspection.
    pub disable_teardown: bool,
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub harness_file: PathBuf,
}

/// Parses and checks the test bench file without touching any infrastructure.
pub fn validate(options: &ValidateOptions) -> Result<HarnessFile> {
    HarnessFile::from_path(&options.harness_file)
}

/// Runs the whole lifecycle. The cluster is destroyed whenever creation got as far as touching
/// infrastructure, even if a later step failed, unless `disable_teardown` is set. The first
/// failure is returned.
///
/// Test bench phases run through `phase_runner`, so they are not bound by the deadline the
/// orchestrator applies to node commands.
pub async fn run<R, P>(
    orchestrator: &mut ClusterOrchestrator<R>,
    phase_runner: &P,
    options: &RunOptions,
) -> Result<()>
where
    R: CommandRunner + 'static,
    P: CommandRunner + ?Sized,
{
    let harness_file = validate(&ValidateOptions {
        harness_file: options.harness_file.clone(),
    })?;
    if options.disable_teardown {
        warn!("Teardown is disabled. Your cluster will stay up until you run 'k8s-harness destroy'.");
    }

    let outcome = exercise(orchestrator, phase_runner, &harness_file).await;
    if options.disable_teardown || orchestrator.state() == ClusterState::Absent {
        return outcome;
    }

    info!("Done. Tearing down the cluster.");
    let destroyed = orchestrator.teardown().await;
    match (outcome, destroyed) {
        (Ok(()), destroyed) => destroyed,
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(destroy_error)) => {
            error!(
                "Unable to destroy the cluster after an earlier failure: {}",
                destroy_error
            );
            Err(e)
        }
    }
}

async fn exercise<R, P>(
    orchestrator: &mut ClusterOrchestrator<R>,
    phase_runner: &P,
    harness_file: &HarnessFile,
) -> Result<()>
where
    R: CommandRunner + 'static,
    P: CommandRunner + ?Sized,
{
    info!("Creating your cluster now. Provisioning will occur in a few minutes.");
    orchestrator.create().await?;
    orchestrator.provision().await?;
    let info = orchestrator.ensure_ready()?;
    info!(
        "{}",
        describe(
            info,
            &orchestrator.store().path(CLUSTER_DESCRIPTOR_FILENAME)
        )
    );

    let tests = TestRunner::new(
        phase_runner,
        harness_file,
        info.kubeconfig_path().map(Path::to_path_buf),
    );
    let tested = match tests.setup().await {
        Ok(_) => tests.test().await.map(|_| ()),
        Err(e) => Err(e),
    };
    // The user's teardown runs even when setup or the tests failed.
    let torn_down = tests.teardown().await.map(|_| ());
    match (tested, torn_down) {
        (Err(e), Err(teardown_error)) => {
            error!("The teardown phase also failed: {}", teardown_error);
            Err(e)
        }
        (tested, torn_down) => tested.and(torn_down),
    }
}

/// A human-readable summary of a created cluster.
pub fn describe(info: &ClusterInfo, descriptor_path: &Path) -> String {
    let workers = info
        .worker_addresses()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let kubeconfig = info
        .kubeconfig_path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "not yet available".to_string());
    format!(
        "Cluster has been created. Details are below and in YAML at {}:\n\n\
        \x20   * Master address: '{}'\n\
        \x20   * Worker addresses: [{}]\n\
        \x20   * Docker registry address: '{}'\n\
        \x20   * Kubeconfig path: {}\n\
        \x20   * SSH key path: {}",
        descriptor_path.display(),
        info.master_address(),
        workers,
        info.registry_address(),
        kubeconfig,
        info.ssh_key_path().display()
    )
}
