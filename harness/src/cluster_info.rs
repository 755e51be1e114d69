use crate::error::{self, CommandFailure, Result};
use crate::process::ProcessResult;
use crate::topology::Topology;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::{ensure, OptionExt};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

const IPV4_PATTERN_REGEX: &str = r"\b(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b";

lazy_static::lazy_static! {
    static ref IPV4_REGEX: Regex = {
        #[allow(clippy::unwrap_used)]
        Regex::new(IPV4_PATTERN_REGEX).unwrap()
    };
}

/// Returns the first dotted-quad in `output`. Nodes often print several addresses; only the first
/// one is authoritative, so a first match that is not a valid address yields `None`.
pub fn first_ipv4(output: &str) -> Option<Ipv4Addr> {
    IPV4_REGEX
        .find(output)
        .and_then(|m| m.as_str().parse().ok())
}

/// The join token for a cluster: a SHA-256 hex digest of the master address, every worker address
/// in order and the registry address, concatenated.
pub fn cluster_token(master: Ipv4Addr, workers: &[Ipv4Addr], registry: Ipv4Addr) -> String {
    let mut hasher = Sha256::new();
    hasher.update(master.to_string());
    for worker in workers {
        hasher.update(worker.to_string());
    }
    hasher.update(registry.to_string());
    hex::encode(hasher.finalize())
}

/// Everything known about a live cluster. Only `kubeconfig_path` changes after construction.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    master_address: Ipv4Addr,
    worker_addresses: Vec<Ipv4Addr>,
    registry_address: Ipv4Addr,
    cluster_token: String,
    /// `None` until provisioning has retrieved the cluster credentials.
    kubeconfig_path: Option<PathBuf>,
    ssh_key_path: PathBuf,
}

impl ClusterInfo {
    pub fn new<P>(
        master_address: Ipv4Addr,
        worker_addresses: Vec<Ipv4Addr>,
        registry_address: Ipv4Addr,
        ssh_key_path: P,
    ) -> Self
    where
        P: Into<PathBuf>,
    {
        let cluster_token = cluster_token(master_address, &worker_addresses, registry_address);
        Self {
            master_address,
            worker_addresses,
            registry_address,
            cluster_token,
            kubeconfig_path: None,
            ssh_key_path: ssh_key_path.into(),
        }
    }

    /// Builds the cluster description from the address lookup results, keyed by node name. Fails
    /// without building anything if any node's lookup failed, is missing, or printed no address.
    pub fn from_discovery<P>(
        topology: &Topology,
        discovery: &BTreeMap<String, ProcessResult>,
        ssh_key_path: P,
    ) -> Result<Self>
    where
        P: Into<PathBuf>,
    {
        let failures: Vec<CommandFailure> = discovery
            .values()
            .filter(|result| !result.succeeded())
            .map(CommandFailure::from)
            .collect();
        ensure!(
            failures.is_empty(),
            error::AggregateSnafu {
                action: "Failed to discover the cluster's addresses",
                failures,
            }
        );

        let address_of = |node: &str| -> Result<Ipv4Addr> {
            let stdout = discovery
                .get(node)
                .map(|result| result.stdout.as_str())
                .unwrap_or_default();
            first_ipv4(stdout).context(error::NoAddressSnafu { node, stdout })
        };

        let master_address = address_of(topology.master())?;
        let worker_addresses = topology
            .workers()
            .iter()
            .map(|worker| address_of(worker))
            .collect::<Result<Vec<_>>>()?;
        let registry_address = address_of(topology.registry())?;
        Ok(Self::new(
            master_address,
            worker_addresses,
            registry_address,
            ssh_key_path,
        ))
    }

    pub fn master_address(&self) -> Ipv4Addr {
        self.master_address
    }

    pub fn worker_addresses(&self) -> &[Ipv4Addr] {
        &self.worker_addresses
    }

    pub fn registry_address(&self) -> Ipv4Addr {
        self.registry_address
    }

    pub fn cluster_token(&self) -> &str {
        &self.cluster_token
    }

    pub fn kubeconfig_path(&self) -> Option<&Path> {
        self.kubeconfig_path.as_deref()
    }

    pub fn ssh_key_path(&self) -> &Path {
        &self.ssh_key_path
    }

    /// Records where the retrieved credentials were written. Set once, after provisioning.
    pub(crate) fn set_kubeconfig_path(&mut self, path: PathBuf) {
        self.kubeconfig_path = Some(path);
    }

    /// Every address in provisioning order: master, workers, registry.
    pub fn all_addresses(&self) -> Vec<Ipv4Addr> {
        std::iter::once(self.master_address)
            .chain(self.worker_addresses.iter().copied())
            .chain(std::iter::once(self.registry_address))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn ok(command: &str, stdout: &str) -> ProcessResult {
        ProcessResult {
            command: command.to_string(),
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn first_match_wins() {
        let output = "inet 10.0.0.5\ninet 192.168.1.20\nbroadcast 10.0.0.255";
        assert_eq!(first_ipv4(output), Some(ip("10.0.0.5")));
    }

    #[test]
    fn out_of_range_octets_are_not_addresses() {
        assert_eq!(first_ipv4("999.1.1.1 and 300.2.2.2"), None);
        assert_eq!(first_ipv4("version 1.2.3"), None);
        assert_eq!(first_ipv4("no addresses here"), None);
    }

    #[test]
    fn later_addresses_never_replace_a_bad_first_match() {
        // Leading zeros match the pattern but are not a valid address.
        assert_eq!(first_ipv4("010.0.0.5\n10.0.0.6\n"), None);
    }

    #[test]
    fn token_is_deterministic() {
        let a = cluster_token(ip("1.2.3.4"), &[ip("1.2.3.5")], ip("1.2.3.6"));
        let b = cluster_token(ip("1.2.3.4"), &[ip("1.2.3.5")], ip("1.2.3.6"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn token_changes_with_any_address() {
        let base = cluster_token(ip("1.2.3.4"), &[ip("1.2.3.5"), ip("1.2.3.6")], ip("1.2.3.7"));
        let variants = vec![
            cluster_token(ip("1.2.3.9"), &[ip("1.2.3.5"), ip("1.2.3.6")], ip("1.2.3.7")),
            cluster_token(ip("1.2.3.4"), &[ip("1.2.3.9"), ip("1.2.3.6")], ip("1.2.3.7")),
            cluster_token(ip("1.2.3.4"), &[ip("1.2.3.5"), ip("1.2.3.9")], ip("1.2.3.7")),
            cluster_token(ip("1.2.3.4"), &[ip("1.2.3.5"), ip("1.2.3.6")], ip("1.2.3.9")),
            cluster_token(ip("1.2.3.4"), &[ip("1.2.3.6"), ip("1.2.3.5")], ip("1.2.3.7")),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }

    #[test]
    fn discovery_reassociates_by_node_name() {
        let topology = Topology::new(
            "m",
            vec!["w-b".to_string(), "w-a".to_string()],
            "r",
            "",
        )
        .unwrap();
        // BTreeMap iterates alphabetically; worker order must still follow the topology.
        let discovery = btreemap! {
            "m".to_string() => ok("lookup m", "1.2.3.4\n"),
            "w-a".to_string() => ok("lookup w-a", "1.2.3.10\n"),
            "w-b".to_string() => ok("lookup w-b", "1.2.3.20\n1.2.3.21\n"),
            "r".to_string() => ok("lookup r", "1.2.3.30"),
        };
        let info = ClusterInfo::from_discovery(&topology, &discovery, "/data/ssh_key").unwrap();
        assert_eq!(info.master_address(), ip("1.2.3.4"));
        assert_eq!(info.worker_addresses(), &[ip("1.2.3.20"), ip("1.2.3.10")]);
        assert_eq!(info.registry_address(), ip("1.2.3.30"));
        assert_eq!(info.kubeconfig_path(), None);
        assert_eq!(
            info.cluster_token(),
            cluster_token(
                ip("1.2.3.4"),
                &[ip("1.2.3.20"), ip("1.2.3.10")],
                ip("1.2.3.30")
            )
        );
    }

    #[test]
    fn discovery_fails_when_a_lookup_failed() {
        let topology = Topology::new("m", vec!["w".to_string()], "r", "").unwrap();
        let mut failed = ok("lookup w", "");
        failed.exit_code = 255;
        failed.stderr = "connection refused".to_string();
        let discovery = btreemap! {
            "m".to_string() => ok("lookup m", "1.2.3.4"),
            "w".to_string() => failed,
            "r".to_string() => ok("lookup r", "1.2.3.6"),
        };
        let err = ClusterInfo::from_discovery(&topology, &discovery, "/k").unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].command, "lookup w");
    }

    #[test]
    fn discovery_fails_without_an_address() {
        let topology = Topology::new("m", vec![], "r", "").unwrap();
        let discovery = btreemap! {
            "m".to_string() => ok("lookup m", "1.2.3.4"),
            "r".to_string() => ok("lookup r", "Device \"eth1\" does not exist."),
        };
        let err = ClusterInfo::from_discovery(&topology, &discovery, "/k").unwrap_err();
        assert!(matches!(err, crate::Error::NoAddress { node, .. } if node == "r"));
    }

    #[test]
    fn descriptor_round_trips_through_yaml() {
        let mut info = ClusterInfo::new(ip("1.2.3.4"), vec![ip("1.2.3.5")], ip("1.2.3.6"), "/k");
        info.set_kubeconfig_path(PathBuf::from("/data/kubeconfig"));
        let yaml = serde_yaml::to_string(&info).unwrap();
        assert!(yaml.contains("masterAddress"));
        let parsed: ClusterInfo = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, info);
    }
}
