use crate::executor::Executor;
use crate::ExecError;
use tracing::debug;

/// Docker-CLI-compatible shim binary installed by the full bootstrap.
pub const SHIM_BINARY: &str = "/usr/local/bin/nerdctl";
/// CNI bridge plugin binary the shim needs for container networking.
pub const CNI_BRIDGE_PLUGIN: &str = "/opt/cni/bin/bridge";
/// Bridge network config consumed by the shim's CNI invocation.
pub const CNI_CONFIG_PATH: &str = "/etc/cni/net.d/holdfast-bridge.conflist";
/// Network name the config must declare.
pub const CNI_NETWORK_NAME: &str = "holdfast-bridge";
/// Plugin the config must chain for published ports.
pub const CNI_PORTMAP_PLUGIN: &str = "portmap";

/// Classification of a host's container engine.
///
/// `None` is the "never guess" answer: anything unidentifiable forces a safe
/// full bootstrap rather than silently skipping installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// No usable engine found.
    None,
    /// Real Docker Engine; used as-is.
    Docker,
    /// Docker-compatible shim with working CNI bridge networking.
    ShimComplete,
    /// Docker-compatible shim missing CNI plugins or bridge config.
    ShimIncomplete,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeKind::None => write!(f, "none"),
            RuntimeKind::Docker => write!(f, "docker"),
            RuntimeKind::ShimComplete => write!(f, "shim-complete"),
            RuntimeKind::ShimIncomplete => write!(f, "shim-incomplete"),
        }
    }
}

fn probe(exec: &dyn Executor, command: &str) -> Result<bool, ExecError> {
    Ok(exec.run(command)?.success())
}

/// True when the CNI bridge config exists and carries the required markers
/// (network name and portmap plugin). Shared by detection and convergence so
/// both agree on what "valid" means.
pub(crate) fn cni_config_valid(exec: &dyn Executor) -> Result<bool, ExecError> {
    let out = exec.run(&format!("cat {CNI_CONFIG_PATH}"))?;
    if !out.success() {
        return Ok(false);
    }
    Ok(out.stdout.contains(CNI_NETWORK_NAME) && out.stdout.contains(CNI_PORTMAP_PLUGIN))
}

/// Classify the container engine usable on a host.
///
/// The order of checks is load-bearing: later install logic branches on the
/// result, and an over-eager `Docker` answer would skip a bootstrap the host
/// actually needs.
///
/// 1. No `docker` binary → `None`.
/// 2. Binary present but `docker version` fails → `None`.
/// 3. Version output carries Docker vendor markers → `Docker`.
/// 4. Otherwise, three independent any-one-sufficient shim signals: version
///    text mentions the shim, the shim binary exists, or `docker` resolves to
///    a path containing the shim name.
/// 5. Shim-like hosts are `ShimComplete` only when the CNI bridge plugin
///    binary exists AND the bridge config is valid; else `ShimIncomplete`.
/// 6. Anything else → `None`.
pub fn detect_runtime(exec: &dyn Executor) -> Result<RuntimeKind, ExecError> {
    if !probe(exec, "command -v docker")? {
        debug!("no docker binary on {}", exec.target());
        return Ok(RuntimeKind::None);
    }

    let version = exec.run("docker version 2>&1")?;
    if !version.success() {
        debug!("docker binary present but 'docker version' failed");
        return Ok(RuntimeKind::None);
    }
    let text = version.combined().to_lowercase();

    if text.contains("docker engine") || text.contains("docker.com") {
        return Ok(RuntimeKind::Docker);
    }

    let shim_name = SHIM_BINARY.rsplit('/').next().unwrap_or(SHIM_BINARY);
    let mentions_shim = text.contains(shim_name);
    let shim_binary_exists = probe(exec, &format!("test -x {SHIM_BINARY}"))?;
    let resolves_to_shim = {
        let out = exec.run("readlink -f \"$(command -v docker)\"")?;
        out.success() && out.stdout.contains(shim_name)
    };

    if mentions_shim || shim_binary_exists || resolves_to_shim {
        let plugin_ok = probe(exec, &format!("test -x {CNI_BRIDGE_PLUGIN}"))?;
        let config_ok = cni_config_valid(exec)?;
        if plugin_ok && config_ok {
            return Ok(RuntimeKind::ShimComplete);
        }
        debug!("shim detected but CNI bridge incomplete (plugin={plugin_ok}, config={config_ok})");
        return Ok(RuntimeKind::ShimIncomplete);
    }

    debug!("docker responds but vendor is unidentifiable; treating as none");
    Ok(RuntimeKind::None)
}
