/*!

`k8s-harness` provisions disposable multi-node Kubernetes clusters with Vagrant and Ansible, runs a
test bench against them and tears them down again.

The [`ClusterOrchestrator`] drives the cluster lifecycle. All of its effects go through a
[`CommandRunner`], which makes it possible to exercise the whole lifecycle in tests without any
virtual machines.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]
// Tests are free to unwrap.
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub use cluster_info::{cluster_token, first_ipv4, ClusterInfo};
pub use driver::{RunOptions, ValidateOptions};
pub use error::{CommandFailure, Error, Result};
pub use harness_file::{HarnessFile, Phase, TestRunner};
pub use metadata::MetadataStore;
pub use orchestrator::{ClusterOrchestrator, ClusterState};
pub use process::{CommandRunner, CommandSpec, ProcessResult, ProcessRunner};
pub use settings::Settings;
pub use topology::{Node, NodeRole, Topology};

pub mod ansible;
mod cluster_info;
pub mod driver;
mod error;
pub mod fanout;
pub mod harness_file;
pub mod metadata;
mod orchestrator;
pub mod preflight;
mod process;
pub mod settings;
pub mod topology;
pub mod vagrant;
