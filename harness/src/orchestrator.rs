/*!

Drives a disposable cluster through its lifecycle:

```text
Absent -> Creating -> Created -> Provisioning -> Ready -> Destroying -> Absent
```

Each step that touches nodes fans out one command per node (or per host) and joins on all of them
before looking at the results. Any failure in a batch halts progression with an aggregate error
naming every failed command.

!*/

use crate::ansible::PlaybookRun;
use crate::cluster_info::ClusterInfo;
use crate::error::{self, CommandFailure, Result};
use crate::fanout::{ensure_all_succeeded, fan_out};
use crate::metadata::{
    MetadataStore, CLUSTER_DESCRIPTOR_FILENAME, KUBECONFIG_FILENAME, SSH_KEY_FILENAME,
    SSH_PUBLIC_KEY_FILENAME,
};
use crate::preflight::{default_software, ensure_installed, RequiredSoftware};
use crate::process::{CommandRunner, CommandSpec};
use crate::settings::Settings;
use crate::vagrant::Vagrant;
use log::{debug, info, warn};
use snafu::{ensure, OptionExt};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClusterState {
    Absent,
    Creating,
    Created,
    Provisioning,
    Ready,
    Destroying,
}

impl Display for ClusterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterState::Absent => "absent",
            ClusterState::Creating => "creating",
            ClusterState::Created => "created",
            ClusterState::Provisioning => "provisioning",
            ClusterState::Ready => "ready",
            ClusterState::Destroying => "destroying",
        };
        write!(f, "{}", s)
    }
}

pub struct ClusterOrchestrator<R: CommandRunner + 'static> {
    runner: Arc<R>,
    settings: Settings,
    store: MetadataStore,
    vagrant: Vagrant,
    software: Vec<RequiredSoftware>,
    state: ClusterState,
    cluster: Option<ClusterInfo>,
}

impl<R> ClusterOrchestrator<R>
where
    R: CommandRunner + 'static,
{
    pub fn new(runner: Arc<R>, settings: Settings) -> Self {
        let store = MetadataStore::new(&settings.working_dir, settings.template_dir.clone());
        let vagrant = Vagrant::new(&settings.working_dir);
        Self {
            runner,
            settings,
            store,
            vagrant,
            software: default_software(),
            state: ClusterState::Absent,
            cluster: None,
        }
    }

    /// Replaces the programs probed before a cluster is created.
    pub fn with_required_software(mut self, software: Vec<RequiredSoftware>) -> Self {
        self.software = software;
        self
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn cluster_info(&self) -> Option<&ClusterInfo> {
        self.cluster.as_ref()
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The cluster, if tests may run against it.
    pub fn ensure_ready(&self) -> Result<&ClusterInfo> {
        ensure!(
            self.state == ClusterState::Ready,
            error::InvalidStateSnafu {
                action: "run tests",
                state: self.state
            }
        );
        self.cluster.as_ref().context(error::InvalidStateSnafu {
            action: "run tests",
            state: self.state,
        })
    }

    /// Brings every node up, discovers their addresses and records the cluster.
    pub async fn create(&mut self) -> Result<&ClusterInfo> {
        ensure!(
            self.state == ClusterState::Absent,
            error::InvalidStateSnafu {
                action: "create a cluster",
                state: self.state
            }
        );

        // Nothing below touches infrastructure, so a failure leaves the cluster absent.
        ensure_installed(self.runner.as_ref(), &self.software).await?;
        self.store.init()?;
        self.ensure_ssh_key().await?;

        self.state = ClusterState::Creating;
        self.bring_up().await?;
        let info = self.discover().await?;
        self.store.save_cluster_info(&info)?;

        self.state = ClusterState::Created;
        Ok(self.cluster.insert(info))
    }

    /// Runs the configuration playbook against every host, then retrieves the credentials.
    pub async fn provision(&mut self) -> Result<&ClusterInfo> {
        ensure!(
            self.state == ClusterState::Created,
            error::InvalidStateSnafu {
                action: "provision a cluster",
                state: self.state
            }
        );
        let info = self.cluster.as_ref().context(error::InvalidStateSnafu {
            action: "provision a cluster",
            state: self.state,
        })?;
        self.state = ClusterState::Provisioning;
        info!("Provisioning the cluster. This will take a few minutes.");

        let topology = &self.settings.topology;
        let targets = std::iter::once((topology.master().to_string(), info.master_address()))
            .chain(
                topology
                    .workers()
                    .iter()
                    .cloned()
                    .zip(info.worker_addresses().iter().copied()),
            )
            .chain(std::iter::once((
                topology.registry().to_string(),
                info.registry_address(),
            )));
        let commands = targets
            .map(|(node, target)| {
                let run = PlaybookRun {
                    playbook: self.store.playbook_path(),
                    inventory: self.store.inventory_path(),
                    ssh_key: info.ssh_key_path().to_path_buf(),
                    ssh_user: self.settings.ssh_user.clone(),
                    python_interpreter: self.settings.python_interpreter.clone(),
                    target,
                    extra_vars: vec![format!("k3s_token={}", info.cluster_token())],
                };
                (node, run.command())
            })
            .collect();
        let results = fan_out(&self.runner, commands).await?;
        ensure_all_succeeded("Failed to provision Kubernetes cluster", results.values())?;

        let kubeconfig = self.retrieve_kubeconfig().await?;
        let info = self.cluster.as_mut().context(error::InvalidStateSnafu {
            action: "provision a cluster",
            state: self.state,
        })?;
        if let Some(path) = kubeconfig {
            info.set_kubeconfig_path(path);
        }
        self.state = ClusterState::Ready;
        Ok(info)
    }

    /// Destroys every node if any are running. Succeeds without doing anything when the
    /// virtualization tool knows of no cluster nodes. A failure keeps the lifecycle record so the
    /// destroy can be retried.
    pub async fn teardown(&mut self) -> Result<()> {
        ensure!(
            self.state != ClusterState::Destroying,
            error::InvalidStateSnafu {
                action: "destroy the cluster",
                state: self.state
            }
        );
        let previous = self.state;
        self.state = ClusterState::Destroying;
        match self.destroy_nodes().await {
            Ok(()) => {
                self.state = ClusterState::Absent;
                self.cluster = None;
                Ok(())
            }
            Err(e) => {
                self.state = previous;
                Err(e)
            }
        }
    }

    /// Teardown for a cluster created by an earlier invocation. The lifecycle record, when present,
    /// is loaded so the operator can see what is being destroyed.
    pub async fn destroy_existing(&mut self) -> Result<()> {
        match self.store.load_cluster_info() {
            Ok(Some(info)) => {
                info!(
                    "Found a cluster record: master '{}', workers {:?}, registry '{}'",
                    info.master_address(),
                    info.worker_addresses(),
                    info.registry_address()
                );
                self.cluster = Some(info);
            }
            Ok(None) => debug!("No cluster record found"),
            Err(e) => warn!("Ignoring unreadable cluster record: {}", e),
        }
        self.teardown().await
    }

    async fn ensure_ssh_key(&self) -> Result<()> {
        if self.store.exists(SSH_KEY_FILENAME) {
            debug!("Reusing the existing SSH key for the cluster.");
            return Ok(());
        }
        info!("Creating a new SSH key for the cluster.");
        let command = CommandSpec::new("ssh-keygen")
            .args(["-t", "rsa", "-f"])
            .arg(self.store.ssh_key_path().display().to_string())
            .args(["-q", "-N", ""]);
        let result = self.runner.run(&command).await?;
        ensure!(
            result.succeeded(),
            error::CommandFailedSnafu {
                what: "Unable to create a SSH key for the cluster",
                failure: CommandFailure::from(&result),
            }
        );
        Ok(())
    }

    async fn bring_up(&self) -> Result<()> {
        info!("Creating a new disposable cluster.");
        let commands = self
            .settings
            .topology
            .node_names()
            .into_iter()
            .map(|node| {
                let command = self.vagrant.up(&node);
                (node, command)
            })
            .collect();
        let results = fan_out(&self.runner, commands).await?;
        ensure_all_succeeded("Failed to start Kubernetes cluster", results.values())
    }

    async fn discover(&self) -> Result<ClusterInfo> {
        let commands = self
            .settings
            .topology
            .node_names()
            .into_iter()
            .map(|node| {
                let command = self
                    .vagrant
                    .address_lookup(&node, &self.settings.network_interface);
                (node, command)
            })
            .collect();
        let results = fan_out(&self.runner, commands).await?;
        ClusterInfo::from_discovery(
            &self.settings.topology,
            &results,
            self.store.ssh_key_path(),
        )
    }

    async fn retrieve_kubeconfig(&self) -> Result<Option<std::path::PathBuf>> {
        let result = self
            .runner
            .run(&self.vagrant.read_kubeconfig(self.settings.topology.master()))
            .await?;
        if !result.succeeded() || result.stdout.trim().is_empty() {
            warn!(
                "No kubeconfig created! The cluster is up but its credentials are not available: {}",
                result.stderr.trim()
            );
            return Ok(None);
        }
        self.store
            .write(KUBECONFIG_FILENAME, &result.stdout)
            .map(Some)
    }

    async fn cluster_running(&self) -> Result<bool> {
        let result = self.runner.run(&self.vagrant.global_status()).await?;
        ensure!(
            result.succeeded(),
            error::CommandFailedSnafu {
                what: "Unable to query the status of the cluster nodes",
                failure: CommandFailure::from(&result),
            }
        );
        let prefix = self.settings.topology.prefix();
        Ok(result
            .stdout
            .split_whitespace()
            .any(|token| token.starts_with(prefix)))
    }

    async fn destroy_nodes(&self) -> Result<()> {
        if !self.cluster_running().await? {
            info!("No clusters found to destroy. Stopping.");
            return Ok(());
        }
        info!("Deleting all nodes!");
        let commands = self
            .settings
            .topology
            .node_names()
            .into_iter()
            .map(|node| {
                let command = self.vagrant.destroy(&node);
                (node, command)
            })
            .collect();
        let results = fan_out(&self.runner, commands).await?;
        ensure_all_succeeded("Failed to delete Kubernetes cluster", results.values())?;

        for file in [
            SSH_KEY_FILENAME,
            SSH_PUBLIC_KEY_FILENAME,
            CLUSTER_DESCRIPTOR_FILENAME,
        ] {
            self.store.delete(file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::process::ProcessRunner;

    #[tokio::test]
    async fn provision_requires_a_created_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = ClusterOrchestrator::new(
            Arc::new(ProcessRunner::default()),
            Settings::with_defaults(dir.path()),
        );
        let err = orchestrator.provision().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot provision a cluster while the cluster is absent"
        );
        assert!(orchestrator.ensure_ready().is_err());
    }

    #[tokio::test]
    async fn failed_preflight_leaves_the_cluster_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = ClusterOrchestrator::new(
            Arc::new(ProcessRunner::default()),
            Settings::with_defaults(dir.path()),
        )
        .with_required_software(vec![RequiredSoftware::new("k8s-harness-no-such-binary")]);
        let err = orchestrator.create().await.unwrap_err();
        assert!(matches!(err, crate::Error::MissingSoftware { .. }));
        assert_eq!(orchestrator.state(), ClusterState::Absent);
        assert!(!orchestrator.store().dir().exists());
    }
}
