use crate::config::InstallConfig;
use crate::ComponentError;

/// Point-in-time observation of a component. Recomputed on demand, never
/// persisted. Inspection failures belong in `message` with
/// `healthy == false`, so a fleet-wide status sweep survives one failing
/// inspection; a component returns `Err` from `status()` only when a
/// required capability is missing entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentStatus {
    pub installed: bool,
    pub version: String,
    pub healthy: bool,
    pub message: String,
}

impl ComponentStatus {
    /// Snapshot for a component that could not be inspected.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            installed: false,
            version: String::new(),
            healthy: false,
            message: message.into(),
        }
    }
}

/// Uniform lifecycle contract every infrastructure service implements.
///
/// A component is identified by a unique name and declares the names of the
/// components it depends on; the resolver guarantees dependencies install
/// first. `install` must be idempotent: rerunning against an already
/// converged target is a no-op, and a partially-provisioned or failed
/// target is repaired in place rather than destroyed and recreated.
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn install(&self, config: &InstallConfig) -> Result<(), ComponentError>;

    /// Defaults to `install`: the reconciliation pattern makes install
    /// upgrade-aware, so most components need no separate upgrade path.
    fn upgrade(&self, config: &InstallConfig) -> Result<(), ComponentError> {
        self.install(config)
    }

    fn status(&self) -> Result<ComponentStatus, ComponentError>;

    fn uninstall(&self) -> Result<(), ComponentError>;
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// No-op component with a fixed name and dependency list.
    pub struct StubComponent {
        name: String,
        deps: Vec<String>,
    }

    impl StubComponent {
        pub fn new(name: &str, deps: &[&str]) -> Self {
            Self {
                name: name.to_owned(),
                deps: deps.iter().map(|d| (*d).to_owned()).collect(),
            }
        }
    }

    impl Component for StubComponent {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }

        fn install(&self, _config: &InstallConfig) -> Result<(), ComponentError> {
            Ok(())
        }

        fn status(&self) -> Result<ComponentStatus, ComponentError> {
            Ok(ComponentStatus::default())
        }

        fn uninstall(&self) -> Result<(), ComponentError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::StubComponent;
    use super::*;

    #[test]
    fn upgrade_defaults_to_install() {
        let c = StubComponent::new("a", &[]);
        c.upgrade(&InstallConfig::new()).unwrap();
    }

    #[test]
    fn unhealthy_snapshot_carries_message() {
        let status = ComponentStatus::unhealthy("cannot reach host");
        assert!(!status.healthy);
        assert!(!status.installed);
        assert_eq!(status.message, "cannot reach host");
    }
}
