#![allow(dead_code)]

use async_trait::async_trait;
use k8s_harness::{CommandRunner, CommandSpec, Error, ProcessResult, Settings, Topology};
use std::path::Path;
use std::sync::Mutex;

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

enum Response {
    Output {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    SpawnFailure,
}

/// A [`CommandRunner`] that never starts a process. It records every command it is given and
/// answers from a list of rules; the most recently added matching rule wins and unmatched commands
/// succeed with no output.
pub(crate) struct MockRunner {
    rules: Vec<(Matcher, Response)>,
    invocations: Mutex<Vec<CommandSpec>>,
}

impl MockRunner {
    pub(crate) fn new() -> Self {
        Self {
            rules: Vec::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// A runner that behaves like a healthy Vagrant/Ansible installation for `topology`, where
    /// node `i` reports `addresses[i]`.
    pub(crate) fn healthy(topology: &Topology, addresses: &[&str]) -> Self {
        let status = topology
            .node_names()
            .iter()
            .map(|name| format!("abc1234  {}  virtualbox running /work", name))
            .collect::<Vec<_>>()
            .join("\n");
        let mut runner = Self::new()
            .respond(vagrant("global-status"), &status, "", 0)
            .respond(vagrant_ssh_reading("k3s.yaml"), "apiVersion: v1\n", "", 0);
        for (name, address) in topology.node_names().iter().zip(addresses) {
            runner = runner.respond(
                address_lookup_on(name),
                &format!("{}\n172.17.0.1\n", address),
                "",
                0,
            );
        }
        runner
    }

    pub(crate) fn respond<M>(mut self, matcher: M, stdout: &str, stderr: &str, exit_code: i32) -> Self
    where
        M: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.rules.push((
            Box::new(matcher),
            Response::Output {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        ));
        self
    }

    pub(crate) fn fail<M>(self, matcher: M, stderr: &str) -> Self
    where
        M: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.respond(matcher, "", stderr, 1)
    }

    pub(crate) fn fail_spawn<M>(mut self, matcher: M) -> Self
    where
        M: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.rules.push((Box::new(matcher), Response::SpawnFailure));
        self
    }

    pub(crate) fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.lock().unwrap().clone()
    }

    pub(crate) fn count<M>(&self, matcher: M) -> usize
    where
        M: Fn(&CommandSpec) -> bool,
    {
        self.invocations().iter().filter(|c| matcher(c)).count()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, command: &CommandSpec) -> k8s_harness::Result<ProcessResult> {
        self.invocations.lock().unwrap().push(command.clone());
        let response = self
            .rules
            .iter()
            .rev()
            .find(|(matcher, _)| matcher(command))
            .map(|(_, response)| response);
        match response {
            Some(Response::SpawnFailure) => Err(spawn_error(command)),
            Some(Response::Output {
                stdout,
                stderr,
                exit_code,
            }) => Ok(ProcessResult {
                command: command.to_string(),
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                exit_code: *exit_code,
            }),
            None => Ok(ProcessResult {
                command: command.to_string(),
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            }),
        }
    }
}

fn spawn_error(command: &CommandSpec) -> Error {
    Error::Spawn {
        command: command.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
    }
}

pub(crate) fn vagrant(action: &'static str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    move |c: &CommandSpec| c.program == "vagrant" && c.args.first().map(String::as_str) == Some(action)
}

pub(crate) fn vagrant_on(
    action: &'static str,
    node: &str,
) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    let node = node.to_string();
    move |c: &CommandSpec| vagrant(action)(c) && c.args.last() == Some(&node)
}

pub(crate) fn address_lookup_on(node: &str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    let node = node.to_string();
    move |c: &CommandSpec| {
        vagrant_on("ssh", &node)(c) && c.args.iter().any(|arg| arg.starts_with("ip addr show"))
    }
}

pub(crate) fn vagrant_ssh_reading(
    needle: &'static str,
) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    move |c: &CommandSpec| vagrant("ssh")(c) && c.args.iter().any(|arg| arg.contains(needle))
}

pub(crate) fn playbook_against(address: &str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    let address = address.to_string();
    move |c: &CommandSpec| {
        c.program == "ansible-playbook"
            && c.args
                .windows(2)
                .any(|pair| pair[0] == "-l" && pair[1] == address)
    }
}

/// A configuration run against a single host, as opposed to the `--version` probe.
pub(crate) fn playbook_run() -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    |c: &CommandSpec| c.program == "ansible-playbook" && c.args.iter().any(|arg| arg == "-l")
}

pub(crate) fn program(name: &'static str) -> impl Fn(&CommandSpec) -> bool + Send + Sync {
    move |c: &CommandSpec| c.program == name
}

/// Settings rooted in `dir` with one master, two workers and a registry.
pub(crate) fn settings(dir: &Path) -> Settings {
    let mut settings = Settings::with_defaults(dir);
    settings.topology = topology();
    settings
}

pub(crate) fn topology() -> Topology {
    Topology::new(
        "k3s-node-0",
        vec!["k3s-node-1".to_string(), "k3s-node-2".to_string()],
        "k3s-registry",
        "k3s-",
    )
    .unwrap()
}

pub(crate) const ADDRESSES: &[&str] = &["10.0.0.10", "10.0.0.11", "10.0.0.12", "10.0.0.13"];
