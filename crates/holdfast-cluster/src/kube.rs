//! Kubernetes queries behind a narrow trait, backed by `kubectl`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, trace};

use holdfast_exec::{Executor, ExecutorExt};

use crate::ClusterError;

/// One pod, reduced to what reconciliation needs.
#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    /// Pod phase as reported by the API server (`Running`, `Pending`, ...).
    pub phase: String,
    /// Whether the `Ready` condition is `True`.
    pub ready: bool,
}

/// Capability trait over the Kubernetes queries Holdfast performs.
pub trait KubeClient: Send + Sync {
    /// Pods in `namespace` matching the label `selector`.
    fn get_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodInfo>, ClusterError>;
    fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError>;
    fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError>;
    /// Apply a YAML manifest via `kubectl apply -f -`.
    fn apply_manifest(&self, manifest: &str) -> Result<(), ClusterError>;
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    conditions: Vec<PodCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
}

/// [`KubeClient`] backed by the `kubectl` binary on the execution target.
pub struct KubectlCli {
    exec: Arc<dyn Executor>,
}

impl KubectlCli {
    pub fn new(exec: Arc<dyn Executor>) -> Self {
        Self { exec }
    }
}

impl KubeClient for KubectlCli {
    fn get_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodInfo>, ClusterError> {
        let output = self.exec.run_checked(&format!(
            "kubectl get pods -n {namespace} -l {selector} -o json"
        ))?;
        let list: PodList = serde_json::from_str(output.stdout.trim())
            .map_err(|e| ClusterError::Kube(format!("unparseable pod list: {e}")))?;
        Ok(list
            .items
            .into_iter()
            .map(|item| {
                let ready = item
                    .status
                    .conditions
                    .iter()
                    .any(|c| c.condition_type == "Ready" && c.status == "True");
                PodInfo {
                    name: item.metadata.name,
                    phase: item.status.phase,
                    ready,
                }
            })
            .collect())
    }

    fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        let output = self
            .exec
            .run(&format!("kubectl get namespace {namespace}"))?;
        if output.success() {
            return Ok(true);
        }
        if output.stderr.contains("NotFound") || output.stderr.contains("not found") {
            return Ok(false);
        }
        Err(ClusterError::Kube(format!(
            "querying namespace '{namespace}': {}",
            output.combined()
        )))
    }

    fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        debug!(namespace, "creating namespace");
        self.exec
            .run_checked(&format!("kubectl create namespace {namespace}"))?;
        Ok(())
    }

    fn apply_manifest(&self, manifest: &str) -> Result<(), ClusterError> {
        self.exec.run_checked(&format!(
            "kubectl apply -f - << 'HOLDFAST_EOF'\n{manifest}\nHOLDFAST_EOF"
        ))?;
        Ok(())
    }
}

/// Poll until every pod matching `selector` is ready, and at least one exists.
///
/// `cancel` is consulted before each poll; timing out and a failing query are
/// reported as distinct errors so callers can tell a slow rollout from a
/// broken cluster.
pub fn wait_for_pods_ready(
    kube: &dyn KubeClient,
    namespace: &str,
    selector: &str,
    timeout: Duration,
    tick: Duration,
    cancel: &dyn Fn() -> bool,
) -> Result<(), ClusterError> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel() {
            return Err(ClusterError::Cancelled);
        }
        let pods = kube.get_pods(namespace, selector)?;
        let ready = pods.iter().filter(|p| p.ready).count();
        trace!(namespace, selector, ready, total = pods.len(), "pod readiness poll");
        if !pods.is_empty() && ready == pods.len() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ClusterError::Timeout {
                what: format!("pods '{selector}' in namespace '{namespace}'"),
                waited_secs: timeout.as_secs(),
            });
        }
        std::thread::sleep(tick);
    }
}
