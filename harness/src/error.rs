use crate::harness_file::Phase;
use crate::orchestrator::ClusterState;
use crate::process::ProcessResult;
use snafu::Snafu;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}. Here's why:\n\n{}", action, render_failures(failures)))]
    Aggregate {
        action: String,
        failures: Vec<CommandFailure>,
    },

    #[snafu(display("{}: {}", what, failure))]
    CommandFailed {
        what: String,
        failure: CommandFailure,
    },

    #[snafu(display("Unable to serialize the cluster descriptor: {}", source))]
    DescriptorSerialize { source: serde_yaml::Error },

    #[snafu(display("Unable to parse the cluster descriptor at '{}': {}", path.display(), source))]
    DescriptorParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Node names must be unique, '{}' appears more than once", name))]
    DuplicateNode { name: String },

    #[snafu(display(
        "It appears that your test bench file doesn't exist at '{}'",
        path.display()
    ))]
    HarnessFileMissing { path: PathBuf },

    #[snafu(display("Unable to parse the test bench file '{}': {}", path.display(), source))]
    HarnessFileParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Unable to read the test bench file '{}': {}", path.display(), source))]
    HarnessFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Cannot {} while the cluster is {}", action, state))]
    InvalidState {
        action: &'static str,
        state: ClusterState,
    },

    #[snafu(display("A fan-out task for '{}' did not complete: {}", name, source))]
    Join {
        name: String,
        source: tokio::task::JoinError,
    },

    #[snafu(display("Metadata operation on '{}' failed: {}", path.display(), source))]
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("The {} of '{}' was not captured", stream, command))]
    MissingPipe {
        command: String,
        stream: &'static str,
    },

    #[snafu(display(
        "You are missing the following software:\n\n{}\n\nPlease consult the README to learn \
        what you'll need to install before using k8s-harness.",
        programs.iter().map(|p| format!("- {}", p)).collect::<Vec<_>>().join("\n")
    ))]
    MissingSoftware { programs: Vec<String> },

    #[snafu(display(
        "It appears that your test isn't defined in '{}'. Ensure that a key called 'test' is in \
        '{}'. See .k8sharness.example for an example of what a valid .k8sharness looks like.",
        path.display(),
        path.display()
    ))]
    MissingTestPhase { path: PathBuf },

    #[snafu(display("No IPv4 address found for node '{}' in output '{}'", node, stdout))]
    NoAddress { node: String, stdout: String },

    #[snafu(display("The {} phase failed with exit code {}", phase, exit_code))]
    PhaseFailed { phase: Phase, exit_code: i32 },

    #[snafu(display("Failed to read {} of '{}': {}", stream, command, source))]
    ReadStream {
        command: String,
        stream: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("Unable to read settings from the environment: {}", source))]
    Settings { source: envy::Error },

    #[snafu(display("Failed to spawn '{}': {}", command, source))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("'{}' did not finish within {:?}", command, timeout))]
    Timeout { command: String, timeout: Duration },

    #[snafu(display("Failed waiting for '{}' to exit: {}", command, source))]
    Wait {
        command: String,
        source: std::io::Error,
    },
}

impl Error {
    /// The individual failed commands carried by this error, if any.
    pub fn failures(&self) -> &[CommandFailure] {
        match self {
            Error::Aggregate { failures, .. } => failures,
            Error::CommandFailed { failure, .. } => std::slice::from_ref(failure),
            _ => &[],
        }
    }
}

/// A command that ran to completion and exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
}

impl From<&ProcessResult> for CommandFailure {
    fn from(result: &ProcessResult) -> Self {
        Self {
            command: result.command.clone(),
            exit_code: result.exit_code,
            stderr: result.stderr.clone(),
        }
    }
}

impl Display for CommandFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let header = format!(
            "From command '{}' (exit code {}):",
            self.command, self.exit_code
        );
        let separator = "-".repeat(header.len() + 4);
        write!(f, "{}\n{}\n\n{}", header, separator, self.stderr.trim_end())
    }
}

fn render_failures(failures: &[CommandFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}
