//! Cluster-level capabilities for Holdfast: Helm releases, Kubernetes
//! queries, release reconciliation, and secret-store bootstrap.
//!
//! The crate is split along capability seams. [`helm::HelmClient`] and
//! [`kube::KubeClient`] are narrow traits over the two CLI tools so that
//! reconciliation logic and the component implementations can be exercised
//! against in-memory fakes. [`reconcile::apply_release`] is the idempotent
//! install/upgrade state machine, and [`secret_store`] holds the sealed-store
//! bootstrap sequence together with on-disk key material handling.

pub mod components;
pub mod fake;
pub mod helm;
pub mod kube;
pub mod reconcile;
pub mod secret_store;

pub use helm::{HelmCli, HelmClient, ReleaseInfo, ReleaseSpec, ReleaseStatus};
pub use kube::{KubeClient, KubectlCli, PodInfo};
pub use reconcile::{apply_release, ApplyAction, HealthCheck};
pub use secret_store::{
    bootstrap_secret_store, HealthStatus, HttpSecretStore, KeyMaterial, KeyStore, SecretStoreApi,
};

/// Errors from cluster-level operations.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error(transparent)]
    Exec(#[from] holdfast_exec::ExecError),

    #[error(transparent)]
    Systemd(#[from] holdfast_systemd::SystemdError),

    #[error("helm operation failed: {0}")]
    Helm(String),

    #[error("kubernetes operation failed: {0}")]
    Kube(String),

    #[error("secret store API error: {0}")]
    Api(String),

    #[error("{what} did not become ready within {waited_secs}s")]
    Timeout { what: String, waited_secs: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("manual intervention required: {0}")]
    ManualInterventionRequired(String),

    #[error("key material I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key material encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ClusterError> for holdfast_component::ComponentError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Exec(e) => Self::Exec(e),
            ClusterError::Systemd(e) => Self::Systemd(e),
            other => Self::Source(Box::new(other)),
        }
    }
}
