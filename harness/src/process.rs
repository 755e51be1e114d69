/*!

External process execution. Every effect the harness has on the world goes through a
[`CommandRunner`]; [`ProcessRunner`] is the real implementation and tests substitute their own.

!*/

use crate::error::{self, Result};
use async_trait::async_trait;
use log::{debug, trace};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

const BLOCK_SIZE: usize = 1024;

/// A program, its argument vector and an environment overlay. The overlay is merged over the
/// inherited environment, it never replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// The terminal value of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single command to completion. A non-zero exit is reported through
/// [`ProcessResult::succeeded`]; `Err` is reserved for commands that could not be run at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessResult>;
}

/// Runs commands as child processes, draining stdout and stderr concurrently.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessResult> {
        let command = spec.to_string();
        debug!("Running '{}' with env {:?}", command, spec.env);
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context(error::SpawnSnafu { command: &command })?;
        let stdout = child.stdout.take().context(error::MissingPipeSnafu {
            command: &command,
            stream: "stdout",
        })?;
        let stderr = child.stderr.take().context(error::MissingPipeSnafu {
            command: &command,
            stream: "stderr",
        })?;

        let name = command.clone();
        let complete = async move {
            let (stdout, stderr) = tokio::join!(
                drain(stdout, &name, "stdout"),
                drain(stderr, &name, "stderr")
            );
            let stdout = stdout.context(error::ReadStreamSnafu {
                command: &name,
                stream: "stdout",
            })?;
            let stderr = stderr.context(error::ReadStreamSnafu {
                command: &name,
                stream: "stderr",
            })?;
            // Both streams are at EOF; only now is the exit status authoritative.
            let status = child
                .wait()
                .await
                .context(error::WaitSnafu { command: &name })?;
            Ok::<_, error::Error>((stdout, stderr, status))
        };

        let (stdout, stderr, status) = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, complete)
                .await
                .ok()
                .context(error::TimeoutSnafu {
                    command: &command,
                    timeout,
                })??,
            None => complete.await?,
        };

        let result = ProcessResult {
            command,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code: status.code().unwrap_or(-1),
        };
        debug!(
            "Running '{}' done, rc = {}, stdout = '{}', stderr = '{}'",
            result.command, result.exit_code, result.stdout, result.stderr
        );
        Ok(result)
    }
}

async fn drain<R>(mut stream: R, command: &str, name: &str) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut accumulated = Vec::new();
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        let read = stream.read(&mut block).await?;
        if read == 0 {
            trace!("command: {}, {} has reached EOF", command, name);
            return Ok(accumulated);
        }
        trace!(
            "command: {}, {} chunk: {}",
            command,
            name,
            String::from_utf8_lossy(&block[..read])
        );
        accumulated.extend_from_slice(&block[..read]);
    }
}
