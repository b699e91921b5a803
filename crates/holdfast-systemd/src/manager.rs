use crate::unit::ServiceUnit;
use crate::SystemdError;
use holdfast_exec::executor::ExecutorExt;
use holdfast_exec::Executor;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Parsed `systemctl show` snapshot for one unit.
///
/// Booleans derive from exact comparisons against the systemd state
/// vocabulary; numeric fields parse best-effort (absence means zero, not an
/// error). A missing unit reports `load_state == "not-found"` and therefore
/// `loaded == false` regardless of the other fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
    pub unit_file_state: String,
    pub main_pid: u32,
    pub loaded: bool,
    pub running: bool,
    pub enabled: bool,
    pub failed: bool,
}

impl ServiceStatus {
    pub(crate) fn parse(show_output: &str) -> Self {
        let mut status = Self::default();
        for line in show_output.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "LoadState" => status.load_state = value.to_owned(),
                "ActiveState" => status.active_state = value.to_owned(),
                "SubState" => status.sub_state = value.to_owned(),
                "UnitFileState" => status.unit_file_state = value.to_owned(),
                "MainPID" => status.main_pid = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
        status.loaded = status.load_state == "loaded";
        status.running = status.active_state == "active" && status.sub_state == "running";
        status.enabled = status.unit_file_state == "enabled";
        status.failed = status.active_state == "failed";
        status
    }
}

/// Append `.service` exactly once if no unit suffix is present.
pub fn normalize_unit_name(name: &str) -> String {
    if name.ends_with(".service") {
        name.to_owned()
    } else {
        format!("{name}.service")
    }
}

/// Drives systemd on a target host through the remote executor.
pub struct SystemdManager<'a> {
    exec: &'a dyn Executor,
}

impl<'a> SystemdManager<'a> {
    pub fn new(exec: &'a dyn Executor) -> Self {
        Self { exec }
    }

    /// Write a unit file to `/etc/systemd/system/<name>.service` and reload
    /// the manager. Sequential; the first failure aborts.
    pub fn create_service(&self, name: &str, unit: &ServiceUnit) -> Result<(), SystemdError> {
        let unit_name = normalize_unit_name(name);
        let path = format!("/etc/systemd/system/{unit_name}");
        info!("writing unit {path} on {}", self.exec.target());

        let write = format!("cat > {path} << 'EOF'\n{}\nEOF", unit.render());
        self.exec.run_checked(&write)?;
        self.exec.run_checked("systemctl daemon-reload")?;
        Ok(())
    }

    pub fn enable(&self, name: &str) -> Result<(), SystemdError> {
        self.verb("enable", name)
    }

    pub fn start(&self, name: &str) -> Result<(), SystemdError> {
        self.verb("start", name)
    }

    pub fn stop(&self, name: &str) -> Result<(), SystemdError> {
        self.verb("stop", name)
    }

    pub fn restart(&self, name: &str) -> Result<(), SystemdError> {
        self.verb("restart", name)
    }

    pub fn disable(&self, name: &str) -> Result<(), SystemdError> {
        self.verb("disable", name)
    }

    /// Remove the unit file and reload. Used by uninstall paths.
    pub fn remove_service(&self, name: &str) -> Result<(), SystemdError> {
        let unit_name = normalize_unit_name(name);
        self.exec
            .run_checked(&format!("rm -f /etc/systemd/system/{unit_name}"))?;
        self.exec.run_checked("systemctl daemon-reload")?;
        Ok(())
    }

    fn verb(&self, verb: &str, name: &str) -> Result<(), SystemdError> {
        let unit_name = normalize_unit_name(name);
        debug!("systemctl {verb} {unit_name}");
        self.exec
            .run_checked(&format!("systemctl {verb} {unit_name}"))?;
        Ok(())
    }

    /// Query unit state via `systemctl show`. `show` succeeds even for units
    /// that do not exist, reporting `LoadState=not-found`.
    pub fn service_status(&self, name: &str) -> Result<ServiceStatus, SystemdError> {
        let unit_name = normalize_unit_name(name);
        let out = self
            .exec
            .run_checked(&format!("systemctl show {unit_name} --no-page"))?;
        Ok(ServiceStatus::parse(&out.stdout))
    }

    /// Poll until the unit reaches `target_sub_state` or the timeout elapses.
    ///
    /// Cancellation is observed at every tick before sleeping. The timeout
    /// error is distinct from query failures so callers can tell "never
    /// converged" from "could not query".
    pub fn wait_for_service(
        &self,
        name: &str,
        target_sub_state: &str,
        timeout: Duration,
        tick: Duration,
        cancel: &dyn Fn() -> bool,
    ) -> Result<(), SystemdError> {
        let unit_name = normalize_unit_name(name);
        let started = Instant::now();
        loop {
            if cancel() {
                return Err(SystemdError::Cancelled { unit: unit_name });
            }
            let status = self.service_status(&unit_name)?;
            if status.sub_state == target_sub_state {
                debug!(
                    "{unit_name} reached '{target_sub_state}' after {:?}",
                    started.elapsed()
                );
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(SystemdError::Timeout {
                    unit: unit_name,
                    target: target_sub_state.to_owned(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            std::thread::sleep(tick);
        }
    }
}
