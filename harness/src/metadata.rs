use crate::cluster_info::ClusterInfo;
use crate::error::{self, Result};
use copy_dir::copy_dir;
use log::{debug, warn};
use snafu::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SSH_KEY_FILENAME: &str = "ssh_key";
pub const SSH_PUBLIC_KEY_FILENAME: &str = "ssh_key.pub";
pub const CLUSTER_DESCRIPTOR_FILENAME: &str = "cluster.yaml";
pub const KUBECONFIG_FILENAME: &str = "kubeconfig";
pub const INVENTORY_FILENAME: &str = "inventory";
pub const PLAYBOOK_FILENAME: &str = "site.yml";
pub const DEFAULT_METADATA_DIRNAME: &str = ".k8sharness_data";

/// The working directory that holds everything generated for a cluster: the SSH keypair, the
/// rendered Vagrantfile/inventory/playbook, the cluster descriptor and the retrieved kubeconfig.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
    template_dir: Option<PathBuf>,
}

impl MetadataStore {
    pub fn new<P: Into<PathBuf>>(dir: P, template_dir: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            template_dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.path(SSH_KEY_FILENAME)
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.path(INVENTORY_FILENAME)
    }

    pub fn playbook_path(&self) -> PathBuf {
        self.path(PLAYBOOK_FILENAME)
    }

    /// Creates the directory and copies the cluster templates into it.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).context(error::MetadataSnafu { path: &self.dir })?;
        if let Some(template_dir) = &self.template_dir {
            debug!(
                "Copying templates from '{}' to '{}'",
                template_dir.display(),
                self.dir.display()
            );
            copy_tree(template_dir, &self.dir)?;
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn write<C: AsRef<[u8]>>(&self, name: &str, content: C) -> Result<PathBuf> {
        debug!("Creating new metadata: {}", name);
        let path = self.path(name);
        fs::write(&path, content).context(error::MetadataSnafu { path: &path })?;
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        fs::read_to_string(&path).context(error::MetadataSnafu { path })
    }

    /// Removes `name`; a file that is already gone is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        debug!("Deleting from metadata: {}", name);
        let path = self.path(name);
        match fs::remove_file(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.context(error::MetadataSnafu { path }),
        }
    }

    pub fn save_cluster_info(&self, info: &ClusterInfo) -> Result<PathBuf> {
        let yaml = serde_yaml::to_string(info).context(error::DescriptorSerializeSnafu)?;
        self.write(CLUSTER_DESCRIPTOR_FILENAME, yaml)
    }

    /// Reads the lifecycle record, `None` when no cluster has been recorded.
    pub fn load_cluster_info(&self) -> Result<Option<ClusterInfo>> {
        if !self.exists(CLUSTER_DESCRIPTOR_FILENAME) {
            return Ok(None);
        }
        let yaml = self.read(CLUSTER_DESCRIPTOR_FILENAME)?;
        serde_yaml::from_str(&yaml)
            .context(error::DescriptorParseSnafu {
                path: self.path(CLUSTER_DESCRIPTOR_FILENAME),
            })
            .map(Some)
    }
}

/// Copies the contents of `from` into `to`. Template subdirectories replace any existing copy.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from).context(error::MetadataSnafu { path: from })? {
        let entry = entry.context(error::MetadataSnafu { path: from })?;
        let source = entry.path();
        let destination = to.join(entry.file_name());
        if !source.is_dir() {
            fs::copy(&source, &destination).context(error::MetadataSnafu { path: &source })?;
            continue;
        }
        if destination.exists() {
            fs::remove_dir_all(&destination)
                .context(error::MetadataSnafu { path: &destination })?;
        }
        let skipped = copy_dir(&source, &destination)
            .context(error::MetadataSnafu { path: &source })?;
        for e in skipped {
            warn!("Unable to copy part of '{}': {}", source.display(), e);
        }
    }
    Ok(())
}
