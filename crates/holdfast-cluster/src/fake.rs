//! In-memory fakes for the cluster capability traits.
//!
//! These live in the library (not behind `cfg(test)`) so downstream crates
//! can drive component and reconciliation logic without a cluster.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::helm::{HelmClient, ReleaseInfo, ReleaseSpec, ReleaseStatus};
use crate::kube::{KubeClient, PodInfo};
use crate::secret_store::{HealthStatus, KeyMaterial, SecretStoreApi};
use crate::ClusterError;

/// [`HelmClient`] over an in-memory release table.
///
/// `install` records a deployed release at the requested version; `upgrade`
/// rewrites the stored chart and resets the status to deployed. Counters let
/// tests assert exactly which operations ran.
#[derive(Default)]
pub struct FakeHelm {
    releases: Mutex<Vec<ReleaseInfo>>,
    installs: AtomicUsize,
    upgrades: AtomicUsize,
    uninstalls: AtomicUsize,
    fail_upgrades: AtomicBool,
    repos: Mutex<Vec<(String, String)>>,
}

impl FakeHelm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_releases(releases: Vec<ReleaseInfo>) -> Self {
        let helm = Self::default();
        *helm.releases.lock().unwrap() = releases;
        helm
    }

    /// Make every subsequent `upgrade` call fail.
    #[must_use]
    pub fn failing_upgrades(self) -> Self {
        self.fail_upgrades.store(true, Ordering::SeqCst);
        self
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn upgrade_count(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    pub fn uninstall_count(&self) -> usize {
        self.uninstalls.load(Ordering::SeqCst)
    }

    pub fn added_repos(&self) -> Vec<(String, String)> {
        self.repos.lock().unwrap().clone()
    }

    fn chart_field(spec: &ReleaseSpec) -> String {
        if spec.version.is_empty() {
            spec.chart_short_name().to_string()
        } else {
            format!("{}-{}", spec.chart_short_name(), spec.version)
        }
    }
}

impl HelmClient for FakeHelm {
    fn add_repo(&self, name: &str, url: &str) -> Result<(), ClusterError> {
        self.repos
            .lock()
            .unwrap()
            .push((name.to_string(), url.to_string()));
        Ok(())
    }

    fn install(&self, spec: &ReleaseSpec) -> Result<(), ClusterError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.releases.lock().unwrap().push(ReleaseInfo {
            name: spec.release.clone(),
            namespace: spec.namespace.clone(),
            chart: Self::chart_field(spec),
            app_version: String::new(),
            status: ReleaseStatus::Deployed,
        });
        Ok(())
    }

    fn upgrade(&self, spec: &ReleaseSpec) -> Result<(), ClusterError> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        if self.fail_upgrades.load(Ordering::SeqCst) {
            return Err(ClusterError::Helm(format!(
                "upgrade of '{}' failed",
                spec.release
            )));
        }
        let mut releases = self.releases.lock().unwrap();
        match releases.iter_mut().find(|r| r.name == spec.release) {
            Some(release) => {
                release.chart = Self::chart_field(spec);
                release.status = ReleaseStatus::Deployed;
                Ok(())
            }
            None => Err(ClusterError::Helm(format!(
                "release '{}' has no deployed releases",
                spec.release
            ))),
        }
    }

    fn uninstall(&self, release: &str, _namespace: &str) -> Result<(), ClusterError> {
        self.uninstalls.fetch_add(1, Ordering::SeqCst);
        self.releases.lock().unwrap().retain(|r| r.name != release);
        Ok(())
    }

    fn list(&self, namespace: &str) -> Result<Vec<ReleaseInfo>, ClusterError> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.namespace == namespace)
            .cloned()
            .collect())
    }
}

/// [`KubeClient`] with a fixed notion of pod readiness.
#[derive(Default)]
pub struct FakeKube {
    ready: bool,
    namespaces: Mutex<Vec<String>>,
}

impl FakeKube {
    /// Every queried selector reports one ready pod.
    pub fn all_ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Every queried selector reports one pod that never becomes ready.
    pub fn never_ready() -> Self {
        Self::default()
    }
}

impl KubeClient for FakeKube {
    fn get_pods(&self, _namespace: &str, selector: &str) -> Result<Vec<PodInfo>, ClusterError> {
        Ok(vec![PodInfo {
            name: format!("{selector}-0"),
            phase: if self.ready { "Running" } else { "Pending" }.to_string(),
            ready: self.ready,
        }])
    }

    fn namespace_exists(&self, namespace: &str) -> Result<bool, ClusterError> {
        Ok(self
            .namespaces
            .lock()
            .unwrap()
            .iter()
            .any(|n| n == namespace))
    }

    fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        self.namespaces.lock().unwrap().push(namespace.to_string());
        Ok(())
    }

    fn apply_manifest(&self, _manifest: &str) -> Result<(), ClusterError> {
        Ok(())
    }
}

/// [`SecretStoreApi`] with sealed-store semantics in memory.
///
/// Starts uninitialized and sealed. `initialize` generates deterministic
/// keys; unsealing needs `threshold` distinct generated keys, submitted via
/// `unseal`. Every submitted key is recorded so tests can assert order.
pub struct FakeSecretStore {
    state: Mutex<FakeStoreState>,
    unreachable_polls: AtomicUsize,
}

struct FakeStoreState {
    initialized: bool,
    sealed: bool,
    shares: u32,
    threshold: u32,
    keys: Vec<String>,
    submitted: Vec<String>,
    mounts: Vec<String>,
    root_token: String,
}

impl Default for FakeSecretStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeStoreState {
                initialized: false,
                sealed: true,
                shares: 0,
                threshold: 0,
                keys: Vec::new(),
                submitted: Vec::new(),
                mounts: Vec::new(),
                root_token: String::new(),
            }),
            unreachable_polls: AtomicUsize::new(0),
        }
    }
}

impl FakeSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// An already-initialized store, sealed, unsealable with `keys`.
    pub fn initialized_with(keys: Vec<String>, threshold: u32) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.initialized = true;
            state.shares = u32::try_from(keys.len()).unwrap_or(0);
            state.threshold = threshold;
            state.keys = keys;
        }
        store
    }

    /// Fail the first `polls` health checks, as a store still starting up.
    #[must_use]
    pub fn unreachable_for(self, polls: usize) -> Self {
        self.unreachable_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn submitted_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn mounts(&self) -> Vec<String> {
        self.state.lock().unwrap().mounts.clone()
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().unwrap().sealed
    }
}

impl SecretStoreApi for FakeSecretStore {
    fn health(&self) -> Result<HealthStatus, ClusterError> {
        let remaining = self.unreachable_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unreachable_polls.store(remaining - 1, Ordering::SeqCst);
            return Err(ClusterError::Api("connection refused".to_string()));
        }
        let state = self.state.lock().unwrap();
        Ok(HealthStatus {
            initialized: state.initialized,
            sealed: state.sealed,
        })
    }

    fn initialize(&self, shares: u32, threshold: u32) -> Result<KeyMaterial, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.initialized {
            return Err(ClusterError::Api("store is already initialized".to_string()));
        }
        state.initialized = true;
        state.shares = shares;
        state.threshold = threshold;
        state.keys = (0..shares).map(|i| format!("unseal-key-{i}")).collect();
        state.root_token = "root-token-fake".to_string();
        Ok(KeyMaterial {
            root_token: state.root_token.clone(),
            unseal_keys: state.keys.clone(),
            shares,
            threshold,
        })
    }

    fn unseal(&self, key: &str) -> Result<bool, ClusterError> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(ClusterError::Api("store is not initialized".to_string()));
        }
        state.submitted.push(key.to_string());
        let accepted = state
            .submitted
            .iter()
            .filter(|k| state.keys.contains(*k))
            .collect::<std::collections::HashSet<_>>()
            .len();
        if accepted >= state.threshold as usize {
            state.sealed = false;
        }
        Ok(state.sealed)
    }

    fn enable_kv_mount(&self, token: &str, path: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        if state.sealed {
            return Err(ClusterError::Api("store is sealed".to_string()));
        }
        if token != state.root_token && !state.root_token.is_empty() {
            return Err(ClusterError::Api("permission denied".to_string()));
        }
        if state.mounts.iter().any(|m| m == path) {
            return Err(ClusterError::Api(format!(
                "path is already in use at {path}/"
            )));
        }
        state.mounts.push(path.to_string());
        Ok(())
    }

    fn kv_mount_exists(&self, token: &str, path: &str) -> Result<bool, ClusterError> {
        let state = self.state.lock().unwrap();
        if state.sealed {
            return Err(ClusterError::Api("store is sealed".to_string()));
        }
        if token != state.root_token && !state.root_token.is_empty() {
            return Err(ClusterError::Api("permission denied".to_string()));
        }
        Ok(state.mounts.iter().any(|m| m == path))
    }
}
