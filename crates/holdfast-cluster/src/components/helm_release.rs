use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use holdfast_component::{Component, ComponentError, ComponentStatus, InstallConfig};

use crate::components::CancelFlag;
use crate::helm::{HelmClient, ReleaseSpec, ReleaseStatus};
use crate::kube::KubeClient;
use crate::reconcile::{apply_release, HealthCheck};

/// A [`Component`] whose whole lifecycle is one Helm release.
///
/// Covers every cluster-native service: the component differs only in its
/// release spec, health selector, and dependency list, so the presets in
/// [`crate::components`] are thin constructors around this type. Install is
/// reconciliation, which makes it idempotent and upgrade-aware for free.
pub struct HelmReleaseComponent {
    name: String,
    dependencies: Vec<String>,
    spec: ReleaseSpec,
    health: Option<HealthCheck>,
    helm: Arc<dyn HelmClient>,
    kube: Arc<dyn KubeClient>,
    tick: Duration,
    cancel: CancelFlag,
}

impl HelmReleaseComponent {
    pub fn new(
        name: impl Into<String>,
        spec: ReleaseSpec,
        helm: Arc<dyn HelmClient>,
        kube: Arc<dyn KubeClient>,
    ) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            spec,
            health: None,
            helm,
            kube,
            tick: Duration::from_secs(5),
            cancel: Arc::new(|| false),
        }
    }

    #[must_use]
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| (*d).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn health(mut self, check: HealthCheck) -> Self {
        self.health = Some(check);
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

    /// The release spec with per-install config overrides applied.
    ///
    /// `version` replaces the preset chart version; entries under `values`
    /// append as `--set` overrides, serialized compactly for non-strings.
    fn effective_spec(&self, config: &InstallConfig) -> ReleaseSpec {
        let mut spec = self.spec.clone();
        if let Some(version) = config.get_string("version") {
            spec.version = version;
        }
        if let Some(values) = config.get_map("values") {
            for (key, value) in values {
                let rendered = match value.as_str() {
                    Some(s) => s.to_owned(),
                    None => value.to_string(),
                };
                spec.values.push((key, rendered));
            }
        }
        spec
    }
}

impl Component for HelmReleaseComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn install(&self, config: &InstallConfig) -> Result<(), ComponentError> {
        let spec = self.effective_spec(config);
        let action = apply_release(
            self.helm.as_ref(),
            self.kube.as_ref(),
            &spec,
            self.health.as_ref(),
            self.tick,
            &|| (self.cancel)(),
        )
        .map_err(ComponentError::from)?;
        debug!(component = %self.name, ?action, "release reconciled");
        Ok(())
    }

    fn status(&self) -> Result<ComponentStatus, ComponentError> {
        let releases = match self.helm.list(&self.spec.namespace) {
            Ok(releases) => releases,
            Err(err) => return Ok(ComponentStatus::unhealthy(err.to_string())),
        };
        let Some(release) = releases.into_iter().find(|r| r.name == self.spec.release) else {
            return Ok(ComponentStatus::default());
        };
        let version = release
            .chart
            .strip_prefix(&format!("{}-", self.spec.chart_short_name()))
            .unwrap_or(&release.app_version)
            .to_owned();
        Ok(ComponentStatus {
            installed: true,
            version,
            healthy: release.status == ReleaseStatus::Deployed,
            message: release.status.to_string(),
        })
    }

    fn uninstall(&self) -> Result<(), ComponentError> {
        self.helm
            .uninstall(&self.spec.release, &self.spec.namespace)
            .map_err(ComponentError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::fake::{FakeHelm, FakeKube};
    use crate::helm::ReleaseInfo;

    fn component(helm: Arc<FakeHelm>) -> HelmReleaseComponent {
        let spec = ReleaseSpec::new("vault", "hashicorp/vault")
            .namespace("vault")
            .version("0.28.1");
        HelmReleaseComponent::new("secret-backend", spec, helm, Arc::new(FakeKube::all_ready()))
    }

    #[test]
    fn install_is_idempotent() {
        let helm = Arc::new(FakeHelm::new());
        let c = component(Arc::clone(&helm));
        let config = InstallConfig::new();

        c.install(&config).unwrap();
        c.install(&config).unwrap();

        assert_eq!(helm.install_count(), 1);
        assert_eq!(helm.upgrade_count(), 0);
    }

    #[test]
    fn config_overrides_version_and_values() {
        let helm = Arc::new(FakeHelm::new());
        let c = component(Arc::clone(&helm));
        let config = InstallConfig::new()
            .with("version", "0.29.0")
            .with("values", json!({"server.replicas": 3}));

        c.install(&config).unwrap();

        let status = c.status().unwrap();
        assert_eq!(status.version, "0.29.0");
    }

    #[test]
    fn status_reflects_release_state() {
        let helm = Arc::new(FakeHelm::with_releases(vec![ReleaseInfo {
            name: "vault".to_string(),
            namespace: "vault".to_string(),
            chart: "vault-0.28.1".to_string(),
            app_version: "1.17.2".to_string(),
            status: ReleaseStatus::Failed,
        }]));
        let c = component(helm);

        let status = c.status().unwrap();
        assert!(status.installed);
        assert!(!status.healthy);
        assert_eq!(status.version, "0.28.1");
        assert_eq!(status.message, "failed");
    }

    #[test]
    fn status_when_absent_is_not_installed() {
        let c = component(Arc::new(FakeHelm::new()));
        let status = c.status().unwrap();
        assert!(!status.installed);
        assert!(!status.healthy);
    }

    #[test]
    fn uninstall_removes_the_release() {
        let helm = Arc::new(FakeHelm::new());
        let c = component(Arc::clone(&helm));

        c.install(&InstallConfig::new()).unwrap();
        c.uninstall().unwrap();

        assert_eq!(helm.uninstall_count(), 1);
        assert!(!c.status().unwrap().installed);
    }
}
