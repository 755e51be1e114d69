//! Single-host configuration runs with `ansible-playbook`.

use crate::process::CommandSpec;
use log::info;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

pub const ANSIBLE_PLAYBOOK: &str = "ansible-playbook";

/// One playbook run scoped to one host with `-l`, so each host's outcome is attributable.
#[derive(Debug, Clone)]
pub struct PlaybookRun {
    pub playbook: PathBuf,
    pub inventory: PathBuf,
    pub ssh_key: PathBuf,
    pub ssh_user: String,
    pub python_interpreter: String,
    pub target: Ipv4Addr,
    pub extra_vars: Vec<String>,
}

impl PlaybookRun {
    pub fn command(&self) -> CommandSpec {
        info!(
            "Creating a new single-host Ansible Playbook run! playbook: {}, inventory: {}, \
            ssh_key: {}, ip_address: {}, extra_vars: {:?}",
            self.playbook.display(),
            self.inventory.display(),
            self.ssh_key.display(),
            self.target,
            self.extra_vars
        );
        let mut command = CommandSpec::new(ANSIBLE_PLAYBOOK)
            .arg("-i")
            .arg(path_arg(&self.inventory))
            .arg("-e")
            .arg(format!("ansible_ssh_user={}", self.ssh_user));
        for var in &self.extra_vars {
            command = command.arg("-e").arg(var);
        }
        command
            .arg("-l")
            .arg(self.target.to_string())
            .arg("--private-key")
            .arg(path_arg(&self.ssh_key))
            .arg(path_arg(&self.playbook))
            .env("ANSIBLE_HOST_KEY_CHECKING", "no")
            .env("ANSIBLE_SSH_ARGS", "-o IdentitiesOnly=true")
            .env("ANSIBLE_COMMAND_WARNINGS", "False")
            .env("ANSIBLE_PYTHON_INTERPRETER", &self.python_interpreter)
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
