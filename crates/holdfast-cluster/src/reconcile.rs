//! Idempotent reconciliation of a Helm release toward its desired state.
//!
//! [`apply_release`] observes the release, decides between install, upgrade,
//! or no-op, and optionally blocks until the workload's pods report ready.
//! Running it twice in a row must converge: the second run observes a
//! deployed release at the desired version and does nothing.

use std::time::Duration;

use tracing::{info, warn};

use crate::helm::{HelmClient, ReleaseSpec, ReleaseStatus};
use crate::kube::{wait_for_pods_ready, KubeClient};
use crate::ClusterError;

/// What `apply_release` did to converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Installed,
    Upgraded,
    /// The release was already deployed at the desired version.
    Unchanged,
}

/// Post-apply readiness gate: which pods to watch and for how long.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub namespace: String,
    pub selector: String,
    pub timeout: Duration,
}

impl HealthCheck {
    pub fn new(namespace: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            selector: selector.into(),
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Converge a Helm release toward `spec`.
///
/// Decision table, keyed on the observed release:
/// - absent: install
/// - deployed at the desired version: no-op, skip the health gate
/// - deployed at another version, failed, or in-flight: upgrade in place
///
/// An upgrade of a release already in `failed` state that itself fails is
/// escalated to [`ClusterError::ManualInterventionRequired`] with remediation
/// steps, since retrying blindly can wipe release state helm needs for
/// recovery.
pub fn apply_release(
    helm: &dyn HelmClient,
    kube: &dyn KubeClient,
    spec: &ReleaseSpec,
    health: Option<&HealthCheck>,
    tick: Duration,
    cancel: &dyn Fn() -> bool,
) -> Result<ApplyAction, ClusterError> {
    if cancel() {
        return Err(ClusterError::Cancelled);
    }
    if let Some((name, url)) = &spec.repo {
        helm.add_repo(name, url)?;
    }

    let observed = helm
        .list(&spec.namespace)?
        .into_iter()
        .find(|r| r.name == spec.release);

    let action = match observed {
        None => {
            info!(release = %spec.release, "release absent, installing");
            helm.install(spec)?;
            ApplyAction::Installed
        }
        Some(ref release)
            if release.status == ReleaseStatus::Deployed
                && release.matches_version(spec.chart_short_name(), &spec.version) =>
        {
            info!(release = %spec.release, chart = %release.chart, "release already deployed");
            return Ok(ApplyAction::Unchanged);
        }
        Some(release) => {
            info!(
                release = %spec.release,
                status = %release.status,
                chart = %release.chart,
                "release out of date, upgrading in place"
            );
            match helm.upgrade(spec) {
                Ok(()) => {}
                Err(err) if release.status == ReleaseStatus::Failed => {
                    warn!(release = %spec.release, %err, "upgrade of failed release did not recover");
                    return Err(ClusterError::ManualInterventionRequired(format!(
                        "release '{release}' is in failed state and upgrading did not recover it \
                         ({err}). To remediate: inspect the workload with `kubectl get pods -n \
                         {namespace}` and `kubectl describe pods -n {namespace}`, check for stuck \
                         PersistentVolumeClaims with `kubectl get pvc -n {namespace}`, then if the \
                         release is unrecoverable run `helm uninstall {release} --namespace \
                         {namespace}` and re-run the install",
                        release = spec.release,
                        namespace = spec.namespace,
                    )));
                }
                Err(err) => return Err(err),
            }
            ApplyAction::Upgraded
        }
    };

    if let Some(check) = health {
        wait_for_pods_ready(kube, &check.namespace, &check.selector, check.timeout, tick, cancel)?;
    }
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fake::{FakeHelm, FakeKube};
    use crate::helm::ReleaseInfo;

    fn spec() -> ReleaseSpec {
        ReleaseSpec::new("vault", "hashicorp/vault")
            .namespace("vault")
            .version("0.28.1")
    }

    fn deployed(chart: &str) -> ReleaseInfo {
        ReleaseInfo {
            name: "vault".to_string(),
            namespace: "vault".to_string(),
            chart: chart.to_string(),
            app_version: "1.17.2".to_string(),
            status: ReleaseStatus::Deployed,
        }
    }

    #[test]
    fn absent_release_is_installed() {
        let helm = FakeHelm::new();
        let kube = FakeKube::all_ready();
        let spec = spec().repo("hashicorp", "https://helm.releases.hashicorp.com");

        let action = apply_release(&helm, &kube, &spec, None, Duration::from_millis(1), &|| false)
            .unwrap();
        assert_eq!(action, ApplyAction::Installed);
        assert_eq!(helm.install_count(), 1);
        assert_eq!(helm.upgrade_count(), 0);
        assert_eq!(
            helm.added_repos(),
            vec![(
                "hashicorp".to_string(),
                "https://helm.releases.hashicorp.com".to_string()
            )]
        );
    }

    #[test]
    fn second_apply_is_a_noop() {
        let helm = FakeHelm::new();
        let kube = FakeKube::all_ready();
        let tick = Duration::from_millis(1);

        apply_release(&helm, &kube, &spec(), None, tick, &|| false).unwrap();
        let action = apply_release(&helm, &kube, &spec(), None, tick, &|| false).unwrap();

        assert_eq!(action, ApplyAction::Unchanged);
        assert_eq!(helm.install_count(), 1);
        assert_eq!(helm.upgrade_count(), 0);
    }

    #[test]
    fn version_drift_triggers_upgrade() {
        let helm = FakeHelm::with_releases(vec![deployed("vault-0.27.0")]);
        let kube = FakeKube::all_ready();

        let action = apply_release(
            &helm,
            &kube,
            &spec(),
            None,
            Duration::from_millis(1),
            &|| false,
        )
        .unwrap();
        assert_eq!(action, ApplyAction::Upgraded);
        assert_eq!(helm.install_count(), 0);
        assert_eq!(helm.upgrade_count(), 1);
    }

    #[test]
    fn failed_release_is_upgraded_in_place_not_reinstalled() {
        let mut release = deployed("vault-0.28.1");
        release.status = ReleaseStatus::Failed;
        let helm = FakeHelm::with_releases(vec![release]);
        let kube = FakeKube::all_ready();

        let action = apply_release(
            &helm,
            &kube,
            &spec(),
            None,
            Duration::from_millis(1),
            &|| false,
        )
        .unwrap();
        assert_eq!(action, ApplyAction::Upgraded);
        assert_eq!(helm.uninstall_count(), 0);
        assert_eq!(helm.install_count(), 0);
    }

    #[test]
    fn unrecoverable_failed_release_demands_manual_intervention() {
        let mut release = deployed("vault-0.28.1");
        release.status = ReleaseStatus::Failed;
        let helm = FakeHelm::with_releases(vec![release]).failing_upgrades();
        let kube = FakeKube::all_ready();

        let err = apply_release(
            &helm,
            &kube,
            &spec(),
            None,
            Duration::from_millis(1),
            &|| false,
        )
        .unwrap_err();

        match err {
            ClusterError::ManualInterventionRequired(msg) => {
                assert!(msg.contains("helm uninstall vault"));
                assert!(msg.contains("kubectl get pvc"));
            }
            other => panic!("expected manual intervention, got {other}"),
        }
    }

    #[test]
    fn upgrade_failure_of_healthy_release_propagates_as_is() {
        let helm = FakeHelm::with_releases(vec![deployed("vault-0.27.0")]).failing_upgrades();
        let kube = FakeKube::all_ready();

        let err = apply_release(
            &helm,
            &kube,
            &spec(),
            None,
            Duration::from_millis(1),
            &|| false,
        )
        .unwrap_err();
        assert!(matches!(err, ClusterError::Helm(_)));
    }

    #[test]
    fn health_gate_runs_after_install() {
        let helm = FakeHelm::new();
        let kube = FakeKube::never_ready();
        let check = HealthCheck::new("vault", "app=vault").timeout(Duration::from_millis(20));

        let err = apply_release(
            &helm,
            &kube,
            &spec(),
            Some(&check),
            Duration::from_millis(5),
            &|| false,
        )
        .unwrap_err();
        assert!(matches!(err, ClusterError::Timeout { .. }));
        // The install itself happened before the gate failed.
        assert_eq!(helm.install_count(), 1);
    }

    #[test]
    fn noop_skips_the_health_gate() {
        let helm = FakeHelm::with_releases(vec![deployed("vault-0.28.1")]);
        let kube = FakeKube::never_ready();
        let check = HealthCheck::new("vault", "app=vault").timeout(Duration::from_millis(20));

        let action = apply_release(
            &helm,
            &kube,
            &spec(),
            Some(&check),
            Duration::from_millis(5),
            &|| false,
        )
        .unwrap();
        assert_eq!(action, ApplyAction::Unchanged);
    }
}
