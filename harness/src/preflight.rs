use crate::error::{self, Result};
use crate::process::{CommandRunner, CommandSpec};
use log::debug;
use snafu::ensure;

/// A program the harness shells out to, and how to probe that it is installed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequiredSoftware {
    pub program: String,
    pub version_check: CommandSpec,
}

impl RequiredSoftware {
    pub fn new<S: Into<String>>(program: S) -> Self {
        let program = program.into();
        Self {
            version_check: CommandSpec::new(&program).arg("--version"),
            program,
        }
    }
}

pub fn default_software() -> Vec<RequiredSoftware> {
    vec![
        RequiredSoftware::new("vagrant"),
        RequiredSoftware::new("ansible-playbook"),
    ]
}

/// Probes every program and reports all of the missing ones at once.
pub async fn ensure_installed<R>(runner: &R, software: &[RequiredSoftware]) -> Result<()>
where
    R: CommandRunner + ?Sized,
{
    let mut missing = Vec::new();
    for app in software {
        let installed = match runner.run(&app.version_check).await {
            Ok(result) => result.succeeded(),
            Err(e) => {
                debug!("Unable to run '{}': {}", app.version_check, e);
                false
            }
        };
        if !installed {
            missing.push(app.program.clone());
        }
    }
    ensure!(
        missing.is_empty(),
        error::MissingSoftwareSnafu { programs: missing }
    );
    Ok(())
}
