pub mod completions;
pub mod install;
pub mod list;
pub mod resolve;
pub mod status;
pub mod uninstall;

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use holdfast_cluster::components::{
    self, BackupBackend, CancelFlag, RegistryComponent, SecretStoreComponent,
};
use holdfast_cluster::{HelmCli, HelmClient, HttpSecretStore, KubeClient, KubectlCli, SecretStoreApi};
use holdfast_component::{ComponentError, Registry};
use thiserror::Error;

use crate::fleet::FleetConfig;
use crate::signal::shutdown_requested;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_RESOLVE_ERROR: u8 = 3;

/// Failure classification for the binary. Exit codes map from the variant;
/// the rendered message is for the user only and never inspected.
#[derive(Debug, Error)]
pub enum CliError {
    /// Unusable configuration.
    #[error("{0}")]
    Config(String),
    /// The resolver refused the requested component set.
    #[error(transparent)]
    Resolve(ComponentError),
    /// Everything else.
    #[error("{0}")]
    Failure(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_CONFIG_ERROR,
            Self::Resolve(_) => EXIT_RESOLVE_ERROR,
            Self::Failure(_) => EXIT_FAILURE,
        }
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Failure(format!("JSON serialization failed: {e}")))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_health(healthy: bool, installed: bool) -> String {
    use console::Style;
    if !installed {
        Style::new().dim().apply_to("absent").to_string()
    } else if healthy {
        Style::new().green().apply_to("healthy").to_string()
    } else {
        Style::new().red().bold().apply_to("unhealthy").to_string()
    }
}

/// Assemble the full fleet registry for the configured target.
///
/// Every known component is registered up front; which of them actually
/// install is decided per invocation by the resolver. Registration order is
/// irrelevant by design, so components are added in an arbitrary order here.
pub fn build_fleet(config: &FleetConfig) -> Result<Registry, CliError> {
    let exec = config.executor();
    let helm: Arc<dyn HelmClient> = Arc::new(HelmCli::new(Arc::clone(&exec)));
    let kube: Arc<dyn KubeClient> = Arc::new(KubectlCli::new(Arc::clone(&exec)));
    let api: Arc<dyn SecretStoreApi> =
        Arc::new(HttpSecretStore::new(&config.cluster.secret_store_addr));
    let cancel: CancelFlag = Arc::new(shutdown_requested);

    let backend = match config.cluster.backup_backend.as_str() {
        "minio" => BackupBackend::Minio,
        "seaweedfs" => BackupBackend::SeaweedFs,
        other => {
            return Err(CliError::Config(format!(
                "config error: unknown backup backend '{other}' (expected 'minio' or 'seaweedfs')"
            )))
        }
    };

    let registry = Registry::new();
    let add = |c: Arc<dyn holdfast_component::Component>| {
        registry
            .register(c)
            .map_err(|e| CliError::Failure(e.to_string()))
    };
    add(Arc::new(
        RegistryComponent::new(Arc::clone(&exec)).with_cancel(Arc::clone(&cancel)),
    ))?;
    add(Arc::new(
        SecretStoreComponent::new(Arc::clone(&helm), Arc::clone(&kube), api)
            .keys_dir(&config.cluster.keys_dir)
            .with_cancel(Arc::clone(&cancel)),
    ))?;
    add(Arc::new(
        components::cert_manager(Arc::clone(&helm), Arc::clone(&kube))
            .with_cancel(Arc::clone(&cancel)),
    ))?;
    add(Arc::new(
        components::ingress(Arc::clone(&helm), Arc::clone(&kube)).with_cancel(Arc::clone(&cancel)),
    ))?;
    add(Arc::new(
        components::storage(Arc::clone(&helm), Arc::clone(&kube)).with_cancel(Arc::clone(&cancel)),
    ))?;
    add(Arc::new(
        components::observability(Arc::clone(&helm), Arc::clone(&kube))
            .with_cancel(Arc::clone(&cancel)),
    ))?;
    add(Arc::new(
        components::backup(helm, kube, backend).with_cancel(cancel),
    ))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fleet_registers_all_components() {
        let config = FleetConfig::default();
        let registry = build_fleet(&config).unwrap();
        let mut names = registry.list();
        names.sort();
        assert_eq!(
            names,
            vec![
                "backup",
                "cert-manager",
                "ingress",
                "observability",
                "registry",
                "secret-store",
                "storage",
            ]
        );
    }

    #[test]
    fn unknown_backup_backend_is_a_config_error() {
        let config = crate::fleet::FleetConfig::parse("[cluster]\nbackup_backend = \"tape\"")
            .unwrap();
        let err = build_fleet(&config).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("tape"));
    }

    #[test]
    fn exit_codes_map_from_error_variants() {
        assert_eq!(
            CliError::Config("config error: bad".to_owned()).exit_code(),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(
            CliError::Resolve(ComponentError::NotFound("ghost".to_owned())).exit_code(),
            EXIT_RESOLVE_ERROR
        );
        assert_eq!(
            CliError::Resolve(ComponentError::CircularDependency("a".to_owned())).exit_code(),
            EXIT_RESOLVE_ERROR
        );
        assert_eq!(
            CliError::Resolve(ComponentError::MissingDependencies("app -> db".to_owned()))
                .exit_code(),
            EXIT_RESOLVE_ERROR
        );
        assert_eq!(CliError::Failure("boom".to_owned()).exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn json_pretty_serializes() {
        let val = serde_json::json!({"key": "value"});
        let out = json_pretty(&val).unwrap();
        assert!(out.contains("\"key\""));
    }
}
