/*!

The test bench file (`.k8sharness`): up to three shell snippets run against a ready cluster.

```yaml
setup: sh setup.sh
test: kubectl get nodes
teardown: ./teardown.sh
```

`test` is required. The file is validated before any infrastructure is created.

!*/

use crate::error::{self, Result};
use crate::process::{CommandRunner, CommandSpec, ProcessResult};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_HARNESS_FILENAME: &str = ".k8sharness";
const SCRIPT_PATTERN_REGEX: &str = r"\.(sh|bash|zsh)$";

lazy_static! {
    static ref SCRIPT_REGEX: Regex = {
        #[allow(clippy::unwrap_used)]
        Regex::new(SCRIPT_PATTERN_REGEX).unwrap()
    };
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Phase {
    Setup,
    Test,
    Teardown,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Test => write!(f, "test"),
            Phase::Teardown => write!(f, "teardown"),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHarnessFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    teardown: Option<String>,
}

/// A validated test bench file with each phase rendered into a command.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HarnessFile {
    path: PathBuf,
    setup: Option<CommandSpec>,
    test: CommandSpec,
    teardown: Option<CommandSpec>,
}

impl HarnessFile {
    pub fn default_path<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_HARNESS_FILENAME)
    }

    /// Reads, parses and validates the file at `path`.
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        ensure!(path.exists(), error::HarnessFileMissingSnafu { path });
        let contents = std::fs::read_to_string(&path)
            .context(error::HarnessFileReadSnafu { path: &path })?;
        Self::from_contents(path, &contents)
    }

    fn from_contents(path: PathBuf, contents: &str) -> Result<Self> {
        // An empty document is an empty mapping, which then fails on the missing `test`.
        let raw: RawHarnessFile = if contents.trim().is_empty() {
            RawHarnessFile::default()
        } else {
            serde_yaml::from_str(contents)
                .context(error::HarnessFileParseSnafu { path: &path })?
        };
        let test = raw
            .test
            .as_deref()
            .map(render_command)
            .context(error::MissingTestPhaseSnafu { path: &path })?;
        Ok(Self {
            setup: raw.setup.as_deref().map(render_command),
            test,
            teardown: raw.teardown.as_deref().map(render_command),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn phase(&self, phase: Phase) -> Option<&CommandSpec> {
        match phase {
            Phase::Setup => self.setup.as_ref(),
            Phase::Test => Some(&self.test),
            Phase::Teardown => self.teardown.as_ref(),
        }
    }

    /// The rendered commands, keyed by phase name.
    pub fn rendered(&self) -> BTreeMap<String, String> {
        [Phase::Setup, Phase::Test, Phase::Teardown]
            .iter()
            .filter_map(|phase| {
                self.phase(*phase)
                    .map(|command| (phase.to_string(), command.to_string()))
            })
            .collect()
    }
}

/// Scripts are run with `sh <script>`; anything else is handed to `sh -c`.
pub fn render_command(step: &str) -> CommandSpec {
    let step = step.trim();
    if SCRIPT_REGEX.is_match(step) && !step.contains(char::is_whitespace) {
        CommandSpec::new("sh").arg(step)
    } else {
        CommandSpec::new("sh").args(["-c", step])
    }
}

/// Runs the phases of a [`HarnessFile`] one at a time, echoing their output to the operator.
pub struct TestRunner<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    harness_file: &'a HarnessFile,
    kubeconfig: Option<PathBuf>,
}

impl<'a, R> TestRunner<'a, R>
where
    R: CommandRunner + ?Sized,
{
    pub fn new(runner: &'a R, harness_file: &'a HarnessFile, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            runner,
            harness_file,
            kubeconfig,
        }
    }

    pub async fn setup(&self) -> Result<Option<ProcessResult>> {
        self.run_phase(Phase::Setup).await
    }

    pub async fn test(&self) -> Result<Option<ProcessResult>> {
        info!("Running your tests.");
        self.run_phase(Phase::Test).await
    }

    pub async fn teardown(&self) -> Result<Option<ProcessResult>> {
        self.run_phase(Phase::Teardown).await
    }

    /// Returns `Ok(None)` when the phase is not defined.
    pub async fn run_phase(&self, phase: Phase) -> Result<Option<ProcessResult>> {
        let command = match self.harness_file.phase(phase) {
            Some(command) => command.clone(),
            None => {
                info!("No {} phase defined, skipping.", phase);
                return Ok(None);
            }
        };
        let command = match &self.kubeconfig {
            Some(kubeconfig) => command.env("KUBECONFIG", kubeconfig.display().to_string()),
            None => command,
        };
        info!("Running the {} phase: {}", phase, command);
        let result = self.runner.run(&command).await?;
        echo(&result, &mut std::io::stdout(), &mut std::io::stderr());
        ensure!(
            result.succeeded(),
            error::PhaseFailedSnafu {
                phase,
                exit_code: result.exit_code
            }
        );
        Ok(Some(result))
    }
}

/// Output from the user's own commands goes straight to the terminal. A failed echo does not fail
/// the phase.
fn echo<O: Write, E: Write>(result: &ProcessResult, out: &mut O, err: &mut E) {
    if let Err(e) = out.write_all(result.stdout.as_bytes()) {
        warn!("Unable to echo the output of '{}': {}", result.command, e);
    }
    if let Err(e) = err.write_all(result.stderr.as_bytes()) {
        warn!("Unable to echo the errors of '{}': {}", result.command, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(contents: &str) -> Result<HarnessFile> {
        HarnessFile::from_contents(PathBuf::from("/foo/.k8sharness"), contents)
    }

    #[test]
    fn missing_test_key_is_a_configuration_error() {
        let err = parse("setup: echo hi\nteardown: echo bye\n").unwrap_err();
        assert!(matches!(err, crate::Error::MissingTestPhase { .. }));
        assert!(err
            .to_string()
            .starts_with("It appears that your test isn't defined in '/foo/.k8sharness'."));
        assert!(parse("").is_err());
    }

    #[test]
    fn optional_phases_may_be_missing() {
        let file = parse("test: foo\nteardown: bar\n").unwrap();
        assert_eq!(file.phase(Phase::Setup), None);
        assert_eq!(
            file.phase(Phase::Test),
            Some(&CommandSpec::new("sh").args(["-c", "foo"]))
        );
        assert_eq!(
            file.phase(Phase::Teardown),
            Some(&CommandSpec::new("sh").args(["-c", "bar"]))
        );
    }

    #[test]
    fn scripts_are_run_with_sh() {
        let file = parse("setup: foo.sh\ntest: bar\nteardown: ./down.bash\n").unwrap();
        assert_eq!(file.rendered()["setup"], "sh foo.sh");
        assert_eq!(file.rendered()["test"], "sh -c bar");
        assert_eq!(file.rendered()["teardown"], "sh ./down.bash");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse("test: foo\ntests: bar\n").unwrap_err();
        assert!(matches!(err, crate::Error::HarnessFileParse { .. }));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn echo_survives_a_closed_stdout() {
        let result = ProcessResult {
            command: "sh -c test".to_string(),
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            exit_code: 0,
        };
        let mut err = Vec::new();
        echo(&result, &mut ClosedPipe, &mut err);
        assert_eq!(err, b"err\n");
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = HarnessFile::from_path(HarnessFile::default_path(dir.path())).unwrap_err();
        assert!(matches!(err, crate::Error::HarnessFileMissing { .. }));
    }
}
