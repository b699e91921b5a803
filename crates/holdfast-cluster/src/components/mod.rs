//! Concrete [`Component`] implementations and the fleet presets.
//!
//! Cluster-native services are all instances of [`HelmReleaseComponent`];
//! the preset constructors below pin their charts, namespaces, health
//! selectors, and dependency edges. The two host-touching components,
//! [`RegistryComponent`] and [`SecretStoreComponent`], carry their own
//! lifecycle logic.
//!
//! [`Component`]: holdfast_component::Component

use std::sync::Arc;
use std::time::Duration;

mod helm_release;
mod registry_host;
mod secret;

pub use helm_release::HelmReleaseComponent;
pub use registry_host::RegistryComponent;
pub use secret::SecretStoreComponent;

use crate::helm::{HelmClient, ReleaseSpec};
use crate::kube::KubeClient;
use crate::reconcile::HealthCheck;

/// Shared cancellation check, wired to the process signal handler by the
/// binary and to `|| false` in tests.
pub type CancelFlag = Arc<dyn Fn() -> bool + Send + Sync>;

/// Object-storage backend a backup preset ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupBackend {
    /// MinIO running in-cluster.
    Minio,
    /// SeaweedFS S3 gateway running in-cluster.
    SeaweedFs,
}

pub fn cert_manager(
    helm: Arc<dyn HelmClient>,
    kube: Arc<dyn KubeClient>,
) -> HelmReleaseComponent {
    let spec = ReleaseSpec::new("cert-manager", "jetstack/cert-manager")
        .namespace("cert-manager")
        .repo("jetstack", "https://charts.jetstack.io")
        .version("v1.14.4")
        .set("installCRDs", "true");
    HelmReleaseComponent::new("cert-manager", spec, helm, kube)
        .health(health("cert-manager", "app.kubernetes.io/instance=cert-manager"))
}

pub fn ingress(helm: Arc<dyn HelmClient>, kube: Arc<dyn KubeClient>) -> HelmReleaseComponent {
    let spec = ReleaseSpec::new("traefik", "traefik/traefik")
        .namespace("ingress")
        .repo("traefik", "https://traefik.github.io/charts")
        .version("28.0.0");
    HelmReleaseComponent::new("ingress", spec, helm, kube)
        .depends_on(&["cert-manager"])
        .health(health("ingress", "app.kubernetes.io/name=traefik"))
}

pub fn storage(helm: Arc<dyn HelmClient>, kube: Arc<dyn KubeClient>) -> HelmReleaseComponent {
    let spec = ReleaseSpec::new("longhorn", "longhorn/longhorn")
        .namespace("longhorn-system")
        .repo("longhorn", "https://charts.longhorn.io")
        .version("1.6.1");
    HelmReleaseComponent::new("storage", spec, helm, kube)
        .health(health("longhorn-system", "app=longhorn-manager"))
}

pub fn observability(
    helm: Arc<dyn HelmClient>,
    kube: Arc<dyn KubeClient>,
) -> HelmReleaseComponent {
    let spec = ReleaseSpec::new("monitoring", "prometheus-community/kube-prometheus-stack")
        .namespace("observability")
        .repo(
            "prometheus-community",
            "https://prometheus-community.github.io/helm-charts",
        )
        .version("58.1.0");
    HelmReleaseComponent::new("observability", spec, helm, kube)
        .depends_on(&["storage"])
        .health(health("observability", "app.kubernetes.io/name=prometheus"))
}

/// Backup tooling with a pluggable object-storage backend. Both presets are
/// the same chart; only the storage endpoint values differ.
pub fn backup(
    helm: Arc<dyn HelmClient>,
    kube: Arc<dyn KubeClient>,
    backend: BackupBackend,
) -> HelmReleaseComponent {
    let endpoint = match backend {
        BackupBackend::Minio => "http://minio.backup-storage.svc:9000",
        BackupBackend::SeaweedFs => "http://seaweedfs-s3.backup-storage.svc:8333",
    };
    let spec = ReleaseSpec::new("velero", "vmware-tanzu/velero")
        .namespace("backup")
        .repo("vmware-tanzu", "https://vmware-tanzu.github.io/helm-charts")
        .version("6.0.0")
        .set("configuration.backupStorageLocation[0].provider", "aws")
        .set(
            "configuration.backupStorageLocation[0].config.s3Url",
            endpoint,
        );
    HelmReleaseComponent::new("backup", spec, helm, kube)
        .depends_on(&["storage"])
        .health(health("backup", "app.kubernetes.io/name=velero"))
}

fn health(namespace: &str, selector: &str) -> HealthCheck {
    HealthCheck::new(namespace, selector).timeout(Duration::from_secs(300))
}

#[cfg(test)]
mod tests {
    use super::*;

    use holdfast_component::{Component, InstallConfig, Registry};

    use crate::fake::{FakeHelm, FakeKube};

    fn clients() -> (Arc<FakeHelm>, Arc<FakeKube>) {
        (Arc::new(FakeHelm::new()), Arc::new(FakeKube::all_ready()))
    }

    #[test]
    fn presets_declare_expected_dependency_edges() {
        let (helm, kube) = clients();
        assert!(cert_manager(helm.clone(), kube.clone()).dependencies().is_empty());
        assert_eq!(
            ingress(helm.clone(), kube.clone()).dependencies(),
            vec!["cert-manager"]
        );
        assert!(storage(helm.clone(), kube.clone()).dependencies().is_empty());
        assert_eq!(
            observability(helm.clone(), kube.clone()).dependencies(),
            vec!["storage"]
        );
        assert_eq!(
            backup(helm, kube, BackupBackend::Minio).dependencies(),
            vec!["storage"]
        );
    }

    #[test]
    fn backup_backends_differ_only_in_storage_endpoint() {
        let (helm, kube) = clients();

        backup(helm.clone(), kube.clone(), BackupBackend::Minio)
            .install(&InstallConfig::new())
            .unwrap();
        backup(Arc::new(FakeHelm::new()), kube, BackupBackend::SeaweedFs)
            .install(&InstallConfig::new())
            .unwrap();

        // Same release and chart for both.
        let releases = helm.list("backup").unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].name, "velero");
    }

    #[test]
    fn presets_register_and_resolve_in_dependency_order() {
        let (helm, kube) = clients();
        let registry = Registry::new();
        registry.register(Arc::new(storage(helm.clone(), kube.clone()))).unwrap();
        registry.register(Arc::new(cert_manager(helm.clone(), kube.clone()))).unwrap();
        registry.register(Arc::new(ingress(helm.clone(), kube.clone()))).unwrap();
        registry
            .register(Arc::new(observability(helm.clone(), kube.clone())))
            .unwrap();
        registry
            .register(Arc::new(backup(helm, kube, BackupBackend::SeaweedFs)))
            .unwrap();

        let order =
            holdfast_component::resolve_installation_order(&registry, &["backup", "ingress"])
                .unwrap();

        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("storage") < pos("backup"));
        assert!(pos("cert-manager") < pos("ingress"));
    }
}
