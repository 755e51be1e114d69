use anyhow::{Context, Result};
use clap::Parser;
use k8s_harness::driver;
use k8s_harness::{HarnessFile, ValidateOptions};
use std::path::{Path, PathBuf};

/// Parse a test bench file without creating anything.
#[derive(Debug, Parser)]
pub(crate) struct Validate {
    /// Path to the test bench file. Defaults to `.k8sharness` in the working directory.
    #[clap(long = "harness-file")]
    harness_file: Option<PathBuf>,
}

impl Validate {
    pub(crate) fn run(self, base_dir: &Path) -> Result<()> {
        let options = ValidateOptions {
            harness_file: self
                .harness_file
                .unwrap_or_else(|| HarnessFile::default_path(base_dir)),
        };
        let harness_file = driver::validate(&options)?;
        let rendered = serde_yaml::to_string(&harness_file.rendered())
            .context("Unable to render the test bench")?;
        println!(
            "'{}' is valid. It will run:\n{}",
            options.harness_file.display(),
            rendered
        );
        Ok(())
    }
}
