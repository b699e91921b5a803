use crate::executor::Executor;
use crate::runtime::{
    cni_config_valid, detect_runtime, RuntimeKind, CNI_CONFIG_PATH, CNI_NETWORK_NAME, SHIM_BINARY,
};
use crate::ExecError;
use tracing::{debug, info};

/// What `install_runtime` did to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeAction {
    /// A usable engine was already present; nothing was changed.
    AlreadyPresent(RuntimeKind),
    /// A shim was present but CNI networking was repaired.
    Repaired,
    /// The host had no engine; a full bootstrap ran.
    Bootstrapped,
}

/// Bridge network config written to [`CNI_CONFIG_PATH`]. The shim chains the
/// bridge plugin for connectivity and portmap for published ports.
fn cni_config_body() -> String {
    format!(
        r#"{{
  "cniVersion": "1.0.0",
  "name": "{CNI_NETWORK_NAME}",
  "plugins": [
    {{
      "type": "bridge",
      "bridge": "hf0",
      "isGateway": true,
      "ipMasq": true,
      "ipam": {{
        "type": "host-local",
        "ranges": [[{{"subnet": "10.88.0.0/16"}}]]
      }}
    }},
    {{
      "type": "portmap",
      "capabilities": {{"portMappings": true}}
    }}
  ]
}}"#
    )
}

fn write_cni_config_command() -> String {
    format!(
        "mkdir -p /etc/cni/net.d && cat > {CNI_CONFIG_PATH} << 'EOF'\n{}\nEOF",
        cni_config_body()
    )
}

/// Converge the CNI bridge config: check validity first, write only when the
/// file is missing or lacks the required markers. Returns whether anything
/// was written, so callers can log convergence without re-reading the host.
pub fn ensure_cni_config(exec: &dyn Executor) -> Result<bool, ExecError> {
    if cni_config_valid(exec)? {
        debug!("CNI bridge config already valid");
        return Ok(false);
    }
    info!("writing CNI bridge config to {CNI_CONFIG_PATH}");
    let out = exec.run(&write_cni_config_command())?;
    if !out.success() {
        return Err(ExecError::CommandFailed {
            command: format!("write {CNI_CONFIG_PATH}"),
            exit_code: out.exit_code,
            stderr: out.combined(),
        });
    }
    Ok(true)
}

/// Ordered full-bootstrap steps for a host with no container engine.
/// Each step is one discrete remote command; the step index in error
/// messages is 1-based.
fn full_bootstrap_steps() -> Vec<(&'static str, String)> {
    vec![
        (
            "install container daemon and firewall tooling",
            "DEBIAN_FRONTEND=noninteractive apt-get install -y containerd iptables".to_owned(),
        ),
        (
            "create runtime socket-access group",
            "groupadd -f containerd-users".to_owned(),
        ),
        (
            "install CNI plugins",
            "DEBIAN_FRONTEND=noninteractive apt-get install -y containernetworking-plugins \
             && mkdir -p /opt/cni/bin \
             && cp -n /usr/lib/cni/* /opt/cni/bin/"
                .to_owned(),
        ),
        ("write CNI bridge config", write_cni_config_command()),
        (
            "install docker-compatible shim",
            format!(
                "curl -fsSL -o /tmp/nerdctl.tgz \
                 https://github.com/containerd/nerdctl/releases/download/v2.0.0/nerdctl-2.0.0-linux-amd64.tar.gz \
                 && tar -xzf /tmp/nerdctl.tgz -C $(dirname {SHIM_BINARY}) nerdctl \
                 && rm -f /tmp/nerdctl.tgz"
            ),
        ),
        (
            "link docker to shim",
            format!("ln -sf {SHIM_BINARY} /usr/local/bin/docker"),
        ),
        (
            "enable container daemon",
            "systemctl enable --now containerd".to_owned(),
        ),
    ]
}

fn run_steps(exec: &dyn Executor, steps: &[(&str, String)]) -> Result<(), ExecError> {
    for (index, (description, command)) in steps.iter().enumerate() {
        info!("bootstrap step {}: {description}", index + 1);
        let out = exec.run(command)?;
        if !out.success() {
            return Err(ExecError::StepFailed {
                step: index + 1,
                description: (*description).to_owned(),
                output: out.combined(),
            });
        }
    }
    Ok(())
}

/// Bring the host to a usable Docker-compatible runtime.
///
/// Dispatches on the detected classification: real Docker and a complete shim
/// are left untouched, an incomplete shim gets only its missing CNI pieces,
/// and a bare host gets the full bootstrap. The first failed step aborts with
/// its index and captured output.
pub fn install_runtime(exec: &dyn Executor) -> Result<RuntimeAction, ExecError> {
    let detected = detect_runtime(exec)?;
    info!("container runtime on {}: {detected}", exec.target());

    match detected {
        RuntimeKind::Docker | RuntimeKind::ShimComplete => {
            Ok(RuntimeAction::AlreadyPresent(detected))
        }
        RuntimeKind::ShimIncomplete => {
            let repair_steps = [(
                "install CNI plugins",
                "DEBIAN_FRONTEND=noninteractive apt-get install -y containernetworking-plugins \
                 && mkdir -p /opt/cni/bin \
                 && cp -n /usr/lib/cni/* /opt/cni/bin/"
                    .to_owned(),
            )];
            run_steps(exec, &repair_steps)?;
            ensure_cni_config(exec)?;
            Ok(RuntimeAction::Repaired)
        }
        RuntimeKind::None => {
            run_steps(exec, &full_bootstrap_steps())?;
            Ok(RuntimeAction::Bootstrapped)
        }
    }
}

/// Best-effort restart of services that depend on bridge networking after a
/// CNI repair. Failures are accumulated per service rather than aborting on
/// the first, so one broken unit does not block the rest.
pub fn restart_bridge_dependents(
    exec: &dyn Executor,
    services: &[&str],
) -> Result<(), ExecError> {
    let mut failures = Vec::new();
    for service in services {
        let command = format!("systemctl restart {service}");
        match exec.run(&command) {
            Ok(out) if out.success() => debug!("restarted {service}"),
            Ok(out) => failures.push(format!("{service}: {}", out.combined().trim())),
            Err(e) => failures.push(format!("{service}: {e}")),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ExecError::RestartsFailed(failures.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedExecutor;

    fn valid_config_output() -> String {
        cni_config_body()
    }

    #[test]
    fn ensure_cni_config_writes_when_missing() {
        let exec = ScriptedExecutor::new()
            .respond_err(format!("cat {CNI_CONFIG_PATH}"), 1, "No such file")
            .respond_ok("mkdir -p /etc/cni/net.d", "");
        assert!(ensure_cni_config(&exec).unwrap());
        assert_eq!(exec.count_matching("mkdir -p /etc/cni/net.d"), 1);
    }

    #[test]
    fn ensure_cni_config_second_call_is_a_noop() {
        let exec = ScriptedExecutor::new()
            .respond_ok(format!("cat {CNI_CONFIG_PATH}"), valid_config_output());
        // First call: config already valid, nothing written.
        assert!(!ensure_cni_config(&exec).unwrap());
        // Second call: still no write, no additional commands beyond the check.
        assert!(!ensure_cni_config(&exec).unwrap());
        assert_eq!(exec.count_matching("mkdir"), 0);
        assert_eq!(exec.count_matching(&format!("cat {CNI_CONFIG_PATH}")), 2);
    }

    #[test]
    fn install_runtime_noop_for_docker() {
        let exec = ScriptedExecutor::new()
            .respond_ok("command -v docker", "/usr/bin/docker")
            .respond_ok("docker version", "Docker Engine - Community\n");
        assert_eq!(
            install_runtime(&exec).unwrap(),
            RuntimeAction::AlreadyPresent(RuntimeKind::Docker)
        );
        // No mutating commands issued.
        assert_eq!(exec.count_matching("apt-get"), 0);
    }

    #[test]
    fn install_runtime_repairs_incomplete_shim() {
        let exec = ScriptedExecutor::new()
            .respond_ok("command -v docker", "/usr/local/bin/docker")
            .respond_ok("docker version", "nerdctl version 2.0\n")
            .respond_err("test -x /opt/cni/bin/bridge", 1, "")
            .respond_err(format!("cat {CNI_CONFIG_PATH}"), 1, "No such file")
            .respond_ok("DEBIAN_FRONTEND", "")
            .respond_ok("mkdir -p /etc/cni/net.d", "");
        assert_eq!(install_runtime(&exec).unwrap(), RuntimeAction::Repaired);
    }

    #[test]
    fn full_bootstrap_aborts_with_step_index() {
        // Step 1 succeeds, step 2 fails: error must carry index 2 and output.
        let exec = ScriptedExecutor::new()
            .respond_err("command -v docker", 1, "")
            .respond_ok("DEBIAN_FRONTEND=noninteractive apt-get install -y containerd", "")
            .respond_err("groupadd", 1, "groupadd: permission denied");
        let err = install_runtime(&exec).unwrap_err();
        match err {
            ExecError::StepFailed { step, output, .. } => {
                assert_eq!(step, 2);
                assert!(output.contains("permission denied"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn full_bootstrap_runs_all_steps_in_order() {
        let exec = ScriptedExecutor::new()
            .respond_err("command -v docker", 1, "")
            .respond_ok("DEBIAN_FRONTEND", "")
            .respond_ok("groupadd", "")
            .respond_ok("mkdir -p /etc/cni/net.d", "")
            .respond_ok("curl", "")
            .respond_ok("ln -sf", "")
            .respond_ok("systemctl enable", "");
        assert_eq!(install_runtime(&exec).unwrap(), RuntimeAction::Bootstrapped);
        let commands = exec.commands();
        // Detection probe first, then the seven bootstrap steps.
        assert_eq!(commands.len(), 8);
        assert!(commands[1].contains("containerd"));
        assert!(commands[7].contains("systemctl enable"));
    }

    #[test]
    fn restart_accumulates_failures() {
        let exec = ScriptedExecutor::new()
            .respond_ok("systemctl restart good-a", "")
            .respond_err("systemctl restart bad-b", 1, "unit not found")
            .respond_err("systemctl restart bad-c", 1, "timed out");
        let err = restart_bridge_dependents(&exec, &["good-a", "bad-b", "bad-c"]).unwrap_err();
        match err {
            ExecError::RestartsFailed(detail) => {
                assert!(detail.contains("bad-b"));
                assert!(detail.contains("bad-c"));
                assert!(!detail.contains("good-a"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn restart_all_healthy_is_ok() {
        let exec = ScriptedExecutor::new().respond_ok("systemctl restart", "");
        restart_bridge_dependents(&exec, &["a", "b"]).unwrap();
        assert_eq!(exec.count_matching("systemctl restart"), 2);
    }
}
