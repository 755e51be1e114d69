//! Commands for the virtualization tool. Every invocation is pinned to the working directory and
//! forces identity-only SSH without host-key checks, since the hosts are recreated every run.

use crate::process::CommandSpec;
use std::path::Path;

pub const VAGRANT: &str = "vagrant";
pub const KUBECONFIG_REMOTE_COMMAND: &str = "sudo cat /etc/rancher/k3s/k3s.yaml";

#[derive(Debug, Clone)]
pub struct Vagrant {
    env: Vec<(String, String)>,
}

impl Vagrant {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            env: vec![
                (
                    "VAGRANT_CWD".to_string(),
                    working_dir.display().to_string(),
                ),
                ("ANSIBLE_HOST_KEY_CHECKING".to_string(), "no".to_string()),
                (
                    "ANSIBLE_SSH_ARGS".to_string(),
                    "-o IdentitiesOnly=true".to_string(),
                ),
            ],
        }
    }

    fn command(&self, action: &str) -> CommandSpec {
        CommandSpec::new(VAGRANT)
            .arg(action)
            .envs(self.env.iter().cloned())
    }

    pub fn up(&self, node: &str) -> CommandSpec {
        self.command("up").arg(node)
    }

    pub fn destroy(&self, node: &str) -> CommandSpec {
        self.command("destroy").args(["-f", node])
    }

    pub fn ssh(&self, node: &str, remote_command: &str) -> CommandSpec {
        self.command("ssh").args(["-c", remote_command, node])
    }

    pub fn global_status(&self) -> CommandSpec {
        self.command("global-status")
    }

    /// Prints the addresses bound to `interface`, one per line.
    pub fn address_lookup(&self, node: &str, interface: &str) -> CommandSpec {
        self.ssh(node, &address_lookup_command(interface))
    }

    pub fn read_kubeconfig(&self, node: &str) -> CommandSpec {
        self.ssh(node, KUBECONFIG_REMOTE_COMMAND)
    }
}

pub fn address_lookup_command(interface: &str) -> String {
    format!(
        r"ip addr show dev {} | grep '\<inet\>' | awk '{{print $2}}' | cut -f1 -d '/'",
        interface
    )
}
