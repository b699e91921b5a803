use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use holdfast_component::{Component, ComponentError, ComponentStatus, InstallConfig};

use crate::components::CancelFlag;
use crate::helm::{HelmClient, ReleaseSpec};
use crate::kube::KubeClient;
use crate::reconcile::apply_release;
use crate::secret_store::{bootstrap_secret_store, KeyStore, SecretStoreApi};

const RELEASE: &str = "vault";
const NAMESPACE: &str = "vault";
const DEFAULT_CHART_VERSION: &str = "0.28.1";
const DEFAULT_KEYS_DIR: &str = "/var/lib/holdfast/keys";
const DEFAULT_CLUSTER: &str = "default";
const API_TIMEOUT: Duration = Duration::from_secs(300);

/// Secret store: a Vault-compatible release plus the bootstrap that takes it
/// from sealed-and-uninitialized to serving secrets.
///
/// Install deploys the chart, then drives the seal lifecycle through the
/// store's HTTP API. The deployment alone is not enough: pods refuse
/// readiness until unsealed, which is why the release is applied without a
/// pod health gate and the API wait happens in bootstrap instead.
pub struct SecretStoreComponent {
    helm: Arc<dyn HelmClient>,
    kube: Arc<dyn KubeClient>,
    api: Arc<dyn SecretStoreApi>,
    keys_dir: PathBuf,
    tick: Duration,
    cancel: CancelFlag,
}

impl SecretStoreComponent {
    pub fn new(
        helm: Arc<dyn HelmClient>,
        kube: Arc<dyn KubeClient>,
        api: Arc<dyn SecretStoreApi>,
    ) -> Self {
        Self {
            helm,
            kube,
            api,
            keys_dir: PathBuf::from(DEFAULT_KEYS_DIR),
            tick: Duration::from_secs(2),
            cancel: Arc::new(|| false),
        }
    }

    #[must_use]
    pub fn keys_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keys_dir = dir.into();
        self
    }

    #[must_use]
    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn release_spec(&self, config: &InstallConfig) -> ReleaseSpec {
        let version = config
            .get_string("version")
            .unwrap_or_else(|| DEFAULT_CHART_VERSION.to_owned());
        ReleaseSpec::new(RELEASE, "hashicorp/vault")
            .namespace(NAMESPACE)
            .repo("hashicorp", "https://helm.releases.hashicorp.com")
            .version(version)
            .set("server.standalone.enabled", "true")
    }
}

impl Component for SecretStoreComponent {
    fn name(&self) -> &str {
        "secret-store"
    }

    fn install(&self, config: &InstallConfig) -> Result<(), ComponentError> {
        let spec = self.release_spec(config);
        let cluster = config
            .get_string("cluster")
            .unwrap_or_else(|| DEFAULT_CLUSTER.to_owned());

        let action = apply_release(
            self.helm.as_ref(),
            self.kube.as_ref(),
            &spec,
            None,
            self.tick,
            &|| (self.cancel)(),
        )
        .map_err(ComponentError::from)?;
        info!(?action, cluster, "secret store release reconciled");

        let key_store = KeyStore::new(&self.keys_dir);
        bootstrap_secret_store(
            self.api.as_ref(),
            &key_store,
            &cluster,
            API_TIMEOUT,
            self.tick,
            &|| (self.cancel)(),
        )
        .map_err(ComponentError::from)?;
        Ok(())
    }

    fn status(&self) -> Result<ComponentStatus, ComponentError> {
        match self.api.health() {
            Ok(health) => Ok(ComponentStatus {
                installed: health.initialized,
                version: String::new(),
                healthy: health.initialized && !health.sealed,
                message: if health.sealed { "sealed" } else { "unsealed" }.to_owned(),
            }),
            Err(err) => Ok(ComponentStatus::unhealthy(err.to_string())),
        }
    }

    fn uninstall(&self) -> Result<(), ComponentError> {
        self.helm
            .uninstall(RELEASE, NAMESPACE)
            .map_err(ComponentError::from)
    }
}
