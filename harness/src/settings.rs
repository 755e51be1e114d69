use crate::error::{self, Result};
use crate::metadata::DEFAULT_METADATA_DIRNAME;
use crate::topology::Topology;
use serde::Deserialize;
use snafu::ResultExt;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "K8S_HARNESS_";
pub const DEFAULT_SSH_USER: &str = "vagrant";
pub const DEFAULT_NETWORK_INTERFACE: &str = "eth1";
pub const DEFAULT_PYTHON_INTERPRETER: &str = "/usr/bin/python";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 1800;

/// Everything the orchestrator needs to know about its environment. Built once by the caller and
/// passed down; nothing in the library reads configuration from anywhere else.
#[derive(Debug, Clone)]
pub struct Settings {
    pub working_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    pub ssh_user: String,
    pub network_interface: String,
    pub python_interpreter: String,
    /// `None` means commands may run forever.
    pub command_timeout: Option<Duration>,
    /// Deadline for each test bench phase. Unset unless `TEST_TIMEOUT_SECS` is given.
    pub test_timeout: Option<Duration>,
    pub topology: Topology,
}

impl Settings {
    /// Reads `K8S_HARNESS_*` variables from the process environment. `base_dir` anchors the
    /// default working directory.
    pub fn from_env<P: Into<PathBuf>>(base_dir: P) -> Result<Self> {
        let raw = envy::prefixed(ENV_PREFIX)
            .from_env::<EnvSettings>()
            .context(error::SettingsSnafu)?;
        Ok(raw.into_settings(base_dir.into()))
    }

    /// Same as [`Settings::from_env`], with the variables supplied by the caller.
    pub fn from_vars<I, P>(vars: I, base_dir: P) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
        P: Into<PathBuf>,
    {
        let raw = envy::prefixed(ENV_PREFIX)
            .from_iter::<_, EnvSettings>(vars)
            .context(error::SettingsSnafu)?;
        Ok(raw.into_settings(base_dir.into()))
    }

    pub fn with_defaults<P: Into<PathBuf>>(base_dir: P) -> Self {
        EnvSettings::default().into_settings(base_dir.into())
    }
}

#[derive(Debug, Default, Deserialize)]
struct EnvSettings {
    working_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    ssh_user: Option<String>,
    network_interface: Option<String>,
    python_interpreter: Option<String>,
    command_timeout_secs: Option<u64>,
    test_timeout_secs: Option<u64>,
}

impl EnvSettings {
    fn into_settings(self, base_dir: PathBuf) -> Settings {
        let command_timeout = match self
            .command_timeout_secs
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let test_timeout = self
            .test_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Settings {
            working_dir: self
                .working_dir
                .unwrap_or_else(|| base_dir.join(DEFAULT_METADATA_DIRNAME)),
            template_dir: self.template_dir,
            ssh_user: self
                .ssh_user
                .unwrap_or_else(|| DEFAULT_SSH_USER.to_string()),
            network_interface: self
                .network_interface
                .unwrap_or_else(|| DEFAULT_NETWORK_INTERFACE.to_string()),
            python_interpreter: self
                .python_interpreter
                .unwrap_or_else(|| DEFAULT_PYTHON_INTERPRETER.to_string()),
            command_timeout,
            test_timeout,
            topology: Topology::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::from_vars(Vec::new(), "/project").unwrap();
        assert_eq!(settings.working_dir, PathBuf::from("/project/.k8sharness_data"));
        assert_eq!(settings.ssh_user, "vagrant");
        assert_eq!(settings.network_interface, "eth1");
        assert_eq!(settings.command_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(settings.test_timeout, None);
        assert_eq!(settings.topology, Topology::default());
    }

    #[test]
    fn overrides() {
        let vars = vec![
            ("K8S_HARNESS_SSH_USER".to_string(), "ubuntu".to_string()),
            ("K8S_HARNESS_COMMAND_TIMEOUT_SECS".to_string(), "0".to_string()),
            ("K8S_HARNESS_WORKING_DIR".to_string(), "/tmp/h".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let settings = Settings::from_vars(vars, "/project").unwrap();
        assert_eq!(settings.ssh_user, "ubuntu");
        assert_eq!(settings.command_timeout, None);
        assert_eq!(settings.working_dir, PathBuf::from("/tmp/h"));
    }

    #[test]
    fn test_bench_deadline_is_separate_from_node_commands() {
        let vars = vec![
            ("K8S_HARNESS_COMMAND_TIMEOUT_SECS".to_string(), "60".to_string()),
            ("K8S_HARNESS_TEST_TIMEOUT_SECS".to_string(), "7200".to_string()),
        ];
        let settings = Settings::from_vars(vars, "/project").unwrap();
        assert_eq!(settings.command_timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.test_timeout, Some(Duration::from_secs(7200)));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let vars = vec![(
            "K8S_HARNESS_COMMAND_TIMEOUT_SECS".to_string(),
            "soon".to_string(),
        )];
        assert!(Settings::from_vars(vars, "/project").is_err());
    }
}
