use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use holdfast_component::{Component, ComponentError, ComponentStatus, InstallConfig};
use holdfast_exec::{
    detect_runtime, install_runtime, restart_bridge_dependents, Executor, ExecutorExt,
    RuntimeAction, RuntimeKind,
};
use holdfast_systemd::{ServiceUnit, SystemdManager};

use crate::components::CancelFlag;

const UNIT_NAME: &str = "holdfast-registry";
const DEFAULT_IMAGE: &str = "registry:2";
const DEFAULT_PORT: i64 = 5000;
const DEFAULT_DATA_DIR: &str = "/var/lib/holdfast/registry";
const START_TIMEOUT: Duration = Duration::from_secs(60);

/// Host-level container registry, run as a systemd-supervised container.
///
/// The one component that provisions the host itself: install ensures a
/// container runtime exists (bootstrapping one if the host has none), writes
/// a unit that runs the registry image, and blocks until systemd reports the
/// service running. Everything else in the fleet can then pull through it.
pub struct RegistryComponent {
    exec: Arc<dyn Executor>,
    tick: Duration,
    cancel: CancelFlag,
}

impl RegistryComponent {
    pub fn new(exec: Arc<dyn Executor>) -> Self {
        Self {
            exec,
            tick: Duration::from_secs(2),
            cancel: Arc::new(|| false),
        }
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

    /// CLI name of the runtime the unit's exec lines should invoke.
    fn runtime_command(&self) -> Result<&'static str, ComponentError> {
        match detect_runtime(self.exec.as_ref()).map_err(ComponentError::from)? {
            RuntimeKind::Docker => Ok("docker"),
            RuntimeKind::ShimComplete | RuntimeKind::ShimIncomplete => Ok("nerdctl"),
            RuntimeKind::None => Err(ComponentError::from(
                holdfast_exec::ExecError::RuntimeUnavailable(
                    "no container runtime after bootstrap".to_owned(),
                ),
            )),
        }
    }
}

impl Component for RegistryComponent {
    fn name(&self) -> &str {
        "registry"
    }

    fn install(&self, config: &InstallConfig) -> Result<(), ComponentError> {
        let port = config.get_int("port").unwrap_or(DEFAULT_PORT);
        let image = config
            .get_string("image")
            .unwrap_or_else(|| DEFAULT_IMAGE.to_owned());
        let data_dir = config
            .get_string("data_dir")
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_owned());

        let action = install_runtime(self.exec.as_ref()).map_err(ComponentError::from)?;
        info!(?action, "container runtime ensured");
        if action == RuntimeAction::Repaired {
            restart_bridge_dependents(self.exec.as_ref(), &["containerd"])
                .map_err(ComponentError::from)?;
        }
        let runtime = self.runtime_command()?;

        self.exec
            .run_checked(&format!("mkdir -p {data_dir}"))
            .map_err(ComponentError::from)?;

        let mut unit = ServiceUnit::daemon("Holdfast container registry");
        unit.after = vec!["network-online.target".to_owned()];
        unit.exec_start_pre = format!("-{runtime} rm -f {UNIT_NAME}");
        unit.exec_start = format!(
            "{runtime} run --rm --name {UNIT_NAME} -p {port}:5000 \
             -v {data_dir}:/var/lib/registry {image}"
        );
        unit.exec_stop = format!("{runtime} stop {UNIT_NAME}");
        unit.restart_sec = 5;

        let manager = SystemdManager::new(self.exec.as_ref());
        manager.create_service(UNIT_NAME, &unit)?;
        manager.enable(UNIT_NAME)?;
        manager.start(UNIT_NAME)?;
        manager.wait_for_service(UNIT_NAME, "running", START_TIMEOUT, self.tick, &|| {
            (self.cancel)()
        })?;
        Ok(())
    }

    fn status(&self) -> Result<ComponentStatus, ComponentError> {
        let manager = SystemdManager::new(self.exec.as_ref());
        match manager.service_status(UNIT_NAME) {
            Ok(status) => Ok(ComponentStatus {
                installed: status.loaded,
                version: String::new(),
                healthy: status.running,
                message: format!("{}/{}", status.active_state, status.sub_state),
            }),
            Err(err) => Ok(ComponentStatus::unhealthy(err.to_string())),
        }
    }

    fn uninstall(&self) -> Result<(), ComponentError> {
        let manager = SystemdManager::new(self.exec.as_ref());
        manager.stop(UNIT_NAME)?;
        manager.disable(UNIT_NAME)?;
        manager.remove_service(UNIT_NAME)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use holdfast_exec::ScriptedExecutor;

    const RUNNING_STATUS: &str = "LoadState=loaded\nActiveState=active\nSubState=running\n\
                                  UnitFileState=enabled\nMainPID=4242\n";

    /// Scripted host that already has Docker and a running unit.
    fn docker_host() -> ScriptedExecutor {
        ScriptedExecutor::new()
            .respond_ok("command -v docker", "/usr/bin/docker")
            .respond_ok("docker version", "Docker Engine - Community")
            .respond_ok("mkdir -p", "")
            .respond_ok("cat > /etc/systemd/system/", "")
            .respond_ok("systemctl daemon-reload", "")
            .respond_ok("systemctl enable", "")
            .respond_ok("systemctl start", "")
            .respond_ok("systemctl show", RUNNING_STATUS)
    }

    #[test]
    fn install_on_docker_host_skips_bootstrap() {
        let exec = Arc::new(docker_host());
        let c = RegistryComponent::new(Arc::clone(&exec) as Arc<dyn Executor>)
            .tick(Duration::from_millis(1));

        c.install(&InstallConfig::new()).unwrap();

        // No runtime bootstrap steps ran against a Docker host.
        assert_eq!(exec.count_matching("apt-get"), 0);
        assert_eq!(exec.count_matching("curl"), 0);
        // The unit was written, enabled, and started.
        assert_eq!(exec.count_matching("cat > /etc/systemd/system/holdfast-registry"), 1);
        assert_eq!(exec.count_matching("systemctl enable holdfast-registry"), 1);
        assert_eq!(exec.count_matching("systemctl start holdfast-registry"), 1);
    }

    #[test]
    fn unit_exec_lines_use_detected_runtime_and_config() {
        let exec = Arc::new(docker_host());
        let c = RegistryComponent::new(Arc::clone(&exec) as Arc<dyn Executor>)
            .tick(Duration::from_millis(1));
        let config = InstallConfig::new()
            .with("port", 5050)
            .with("image", "registry:2.8");

        c.install(&config).unwrap();

        let write = exec
            .commands()
            .into_iter()
            .find(|c| c.starts_with("cat > /etc/systemd/system/holdfast-registry"))
            .unwrap();
        assert!(write.contains("docker run --rm --name holdfast-registry"));
        assert!(write.contains("-p 5050:5000"));
        assert!(write.contains("registry:2.8"));
    }

    #[test]
    fn status_reports_running_unit_healthy() {
        let exec = Arc::new(
            ScriptedExecutor::new().respond_ok("systemctl show", RUNNING_STATUS),
        );
        let c = RegistryComponent::new(exec);

        let status = c.status().unwrap();
        assert!(status.installed);
        assert!(status.healthy);
        assert_eq!(status.message, "active/running");
    }

    #[test]
    fn status_failure_folds_into_unhealthy_snapshot() {
        let exec = Arc::new(ScriptedExecutor::new().respond_err(
            "systemctl show",
            1,
            "Failed to connect to bus",
        ));
        let c = RegistryComponent::new(exec);

        let status = c.status().unwrap();
        assert!(!status.healthy);
        assert!(status.message.contains("Failed to connect to bus"));
    }

    #[test]
    fn uninstall_stops_disables_and_removes() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .respond_ok("systemctl stop", "")
                .respond_ok("systemctl disable", "")
                .respond_ok("rm -f /etc/systemd/system/", "")
                .respond_ok("systemctl daemon-reload", ""),
        );
        let c = RegistryComponent::new(Arc::clone(&exec) as Arc<dyn Executor>);

        c.uninstall().unwrap();

        assert_eq!(exec.count_matching("systemctl stop holdfast-registry"), 1);
        assert_eq!(exec.count_matching("systemctl disable holdfast-registry"), 1);
        assert_eq!(exec.count_matching("rm -f /etc/systemd/system/holdfast-registry"), 1);
    }
}
