//! Helm release management behind a narrow trait.
//!
//! [`HelmCli`] shells out to the `helm` binary through an [`Executor`], so
//! the same code drives a local cluster or a remote one over SSH. The trait
//! exists so reconciliation and component logic can run against
//! [`crate::fake::FakeHelm`] in tests.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use holdfast_exec::{Executor, ExecutorExt};

use crate::ClusterError;

/// Desired state for a single Helm release.
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
    /// Release name, e.g. `cert-manager`.
    pub release: String,
    /// Target namespace. Created on install if missing.
    pub namespace: String,
    /// Repository alias and URL, added before install when set.
    pub repo: Option<(String, String)>,
    /// Chart reference, e.g. `jetstack/cert-manager`.
    pub chart: String,
    /// Chart version. Empty means "whatever the repo currently serves",
    /// which also disables the version match during reconciliation.
    pub version: String,
    /// `--set key=value` overrides, applied in order.
    pub values: Vec<(String, String)>,
}

impl ReleaseSpec {
    pub fn new(release: impl Into<String>, chart: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            namespace: "default".to_string(),
            repo: None,
            chart: chart.into(),
            version: String::new(),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    #[must_use]
    pub fn repo(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.repo = Some((name.into(), url.into()));
        self
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// The chart's short name, without the repository prefix.
    pub fn chart_short_name(&self) -> &str {
        self.chart.rsplit('/').next().unwrap_or(&self.chart)
    }
}

/// Lifecycle state of an installed release, as reported by `helm list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    PendingInstall,
    PendingUpgrade,
    Uninstalling,
    Unknown,
}

impl ReleaseStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "deployed" => Self::Deployed,
            "failed" => Self::Failed,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" | "pending-rollback" => Self::PendingUpgrade,
            "uninstalling" => Self::Uninstalling,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::Uninstalling => "uninstalling",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// One installed release as observed on the cluster.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    /// Chart name and version joined by a dash, e.g. `cert-manager-v1.14.4`.
    pub chart: String,
    pub app_version: String,
    pub status: ReleaseStatus,
}

impl ReleaseInfo {
    /// Whether this release was installed from `chart` at `version`.
    ///
    /// `helm list` reports the chart as `<name>-<version>`, so the
    /// comparison reconstructs that form. An empty desired version always
    /// matches.
    pub fn matches_version(&self, chart_short_name: &str, version: &str) -> bool {
        if version.is_empty() {
            return true;
        }
        self.chart == format!("{chart_short_name}-{version}")
    }
}

/// Capability trait over Helm release operations.
pub trait HelmClient: Send + Sync {
    fn add_repo(&self, name: &str, url: &str) -> Result<(), ClusterError>;
    fn install(&self, spec: &ReleaseSpec) -> Result<(), ClusterError>;
    fn upgrade(&self, spec: &ReleaseSpec) -> Result<(), ClusterError>;
    fn uninstall(&self, release: &str, namespace: &str) -> Result<(), ClusterError>;
    fn list(&self, namespace: &str) -> Result<Vec<ReleaseInfo>, ClusterError>;
}

/// Shape of one entry in `helm list -o json` output.
#[derive(Debug, Deserialize)]
struct HelmListEntry {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    chart: String,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    status: String,
}

/// Single-quote a value for interpolation into an `sh -c` command line.
/// Embedded single quotes end the quoting, emit an escaped quote, and
/// reopen it.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// [`HelmClient`] backed by the `helm` binary on the execution target.
pub struct HelmCli {
    exec: Arc<dyn Executor>,
}

impl HelmCli {
    pub fn new(exec: Arc<dyn Executor>) -> Self {
        Self { exec }
    }

    fn release_args(spec: &ReleaseSpec) -> String {
        let mut args = format!(
            "--namespace {} --create-namespace",
            sh_quote(&spec.namespace)
        );
        if !spec.version.is_empty() {
            args.push_str(&format!(" --version {}", spec.version));
        }
        for (key, value) in &spec.values {
            args.push_str(&format!(" --set {}", sh_quote(&format!("{key}={value}"))));
        }
        args
    }
}

impl HelmClient for HelmCli {
    fn add_repo(&self, name: &str, url: &str) -> Result<(), ClusterError> {
        debug!(repo = name, url, "adding helm repository");
        self.exec
            .run_checked(&format!("helm repo add {name} {url} --force-update"))?;
        self.exec.run_checked(&format!("helm repo update {name}"))?;
        Ok(())
    }

    fn install(&self, spec: &ReleaseSpec) -> Result<(), ClusterError> {
        debug!(release = %spec.release, chart = %spec.chart, "installing helm release");
        self.exec.run_checked(&format!(
            "helm install {} {} {}",
            spec.release,
            spec.chart,
            Self::release_args(spec)
        ))?;
        Ok(())
    }

    fn upgrade(&self, spec: &ReleaseSpec) -> Result<(), ClusterError> {
        debug!(release = %spec.release, chart = %spec.chart, "upgrading helm release");
        self.exec.run_checked(&format!(
            "helm upgrade {} {} {}",
            spec.release,
            spec.chart,
            Self::release_args(spec)
        ))?;
        Ok(())
    }

    fn uninstall(&self, release: &str, namespace: &str) -> Result<(), ClusterError> {
        self.exec.run_checked(&format!(
            "helm uninstall {release} --namespace {}",
            sh_quote(namespace)
        ))?;
        Ok(())
    }

    fn list(&self, namespace: &str) -> Result<Vec<ReleaseInfo>, ClusterError> {
        let output = self.exec.run_checked(&format!(
            "helm list --namespace {} -o json",
            sh_quote(namespace)
        ))?;
        let entries: Vec<HelmListEntry> = serde_json::from_str(output.stdout.trim())
            .map_err(|e| ClusterError::Helm(format!("unparseable `helm list` output: {e}")))?;
        Ok(entries
            .into_iter()
            .map(|e| ReleaseInfo {
                name: e.name,
                namespace: e.namespace,
                chart: e.chart,
                app_version: e.app_version,
                status: ReleaseStatus::parse(&e.status),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use holdfast_exec::ScriptedExecutor;

    #[test]
    fn list_parses_helm_json_output() {
        let json = r#"[
            {"name":"vault","namespace":"vault","revision":"2",
             "updated":"2026-01-10 09:00:00","status":"deployed",
             "chart":"vault-0.28.1","app_version":"1.17.2"},
            {"name":"traefik","namespace":"ingress","revision":"1",
             "updated":"2026-01-10 09:05:00","status":"failed",
             "chart":"traefik-28.0.0","app_version":"3.0.0"}
        ]"#;
        let exec = Arc::new(ScriptedExecutor::new().respond_ok("helm list", json));
        let helm = HelmCli::new(exec);

        let releases = helm.list("vault").unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].name, "vault");
        assert_eq!(releases[0].status, ReleaseStatus::Deployed);
        assert_eq!(releases[1].status, ReleaseStatus::Failed);
    }

    #[test]
    fn list_rejects_garbage_output() {
        let exec = Arc::new(ScriptedExecutor::new().respond_ok("helm list", "not json"));
        let helm = HelmCli::new(exec);

        let err = helm.list("default").unwrap_err();
        assert!(matches!(err, ClusterError::Helm(_)));
    }

    #[test]
    fn install_builds_full_command_line() {
        let exec = Arc::new(ScriptedExecutor::new().respond_ok("helm install", ""));
        let helm = HelmCli::new(Arc::clone(&exec) as Arc<dyn Executor>);

        let spec = ReleaseSpec::new("cert-manager", "jetstack/cert-manager")
            .namespace("cert-manager")
            .version("v1.14.4")
            .set("installCRDs", "true");
        helm.install(&spec).unwrap();

        let commands = exec.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains("helm install cert-manager jetstack/cert-manager"));
        assert!(commands[0].contains("--namespace 'cert-manager'"));
        assert!(commands[0].contains("--version v1.14.4"));
        assert!(commands[0].contains("--set 'installCRDs=true'"));
    }

    #[test]
    fn set_values_survive_shell_metacharacters() {
        let exec = Arc::new(ScriptedExecutor::new().respond_ok("helm install", ""));
        let helm = HelmCli::new(Arc::clone(&exec) as Arc<dyn Executor>);

        let spec = ReleaseSpec::new("velero", "vmware-tanzu/velero")
            .namespace("backup")
            .set("s3Url", "http://minio.backup-storage.svc:9000")
            .set("annotation", "a value with spaces; $(and substitution)")
            .set("quote", "don't");
        helm.install(&spec).unwrap();

        let command = &exec.commands()[0];
        assert!(command.contains("--set 's3Url=http://minio.backup-storage.svc:9000'"));
        assert!(command.contains("--set 'annotation=a value with spaces; $(and substitution)'"));
        assert!(command.contains(r"--set 'quote=don'\''t'"));
    }

    #[test]
    fn add_repo_updates_after_adding() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .respond_ok("helm repo add", "")
                .respond_ok("helm repo update", ""),
        );
        let helm = HelmCli::new(Arc::clone(&exec) as Arc<dyn Executor>);

        helm.add_repo("jetstack", "https://charts.jetstack.io").unwrap();

        let commands = exec.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("helm repo add jetstack"));
        assert!(commands[1].starts_with("helm repo update jetstack"));
    }

    #[test]
    fn version_match_reconstructs_chart_field() {
        let info = ReleaseInfo {
            name: "vault".to_string(),
            namespace: "vault".to_string(),
            chart: "vault-0.28.1".to_string(),
            app_version: "1.17.2".to_string(),
            status: ReleaseStatus::Deployed,
        };
        assert!(info.matches_version("vault", "0.28.1"));
        assert!(!info.matches_version("vault", "0.27.0"));
        // Empty desired version means "any".
        assert!(info.matches_version("vault", ""));
    }

    #[test]
    fn status_parse_covers_helm_vocabulary() {
        assert_eq!(ReleaseStatus::parse("deployed"), ReleaseStatus::Deployed);
        assert_eq!(ReleaseStatus::parse("failed"), ReleaseStatus::Failed);
        assert_eq!(ReleaseStatus::parse("pending-install"), ReleaseStatus::PendingInstall);
        assert_eq!(ReleaseStatus::parse("pending-rollback"), ReleaseStatus::PendingUpgrade);
        assert_eq!(ReleaseStatus::parse("superseded"), ReleaseStatus::Unknown);
    }
}
