//! Secret-store bootstrap: first-boot initialization, unseal, and on-disk
//! key material handling.
//!
//! The store speaks a Vault-compatible HTTP API. Bootstrap is the most
//! dangerous sequence in the system: key material returned by `initialize`
//! exists nowhere else, so it is persisted to disk BEFORE the first unseal
//! key is submitted. Losing it after initialization leaves the store
//! permanently sealed.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ClusterError;

/// Shares and threshold used when initializing a new store.
pub const DEFAULT_KEY_SHARES: u32 = 5;
pub const DEFAULT_KEY_THRESHOLD: u32 = 3;

/// Mount path enabled for fleet secrets after first unseal.
pub const DEFAULT_KV_MOUNT: &str = "secret";

/// Reachability and seal state of the store.
#[derive(Debug, Clone, Copy)]
pub struct HealthStatus {
    pub initialized: bool,
    pub sealed: bool,
}

/// Root token and unseal keys returned by initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterial {
    pub root_token: String,
    pub unseal_keys: Vec<String>,
    pub shares: u32,
    pub threshold: u32,
}

/// Capability trait over the secret store's system API.
pub trait SecretStoreApi: Send + Sync {
    /// Query reachability and seal state. An unreachable store is an error,
    /// not a health status.
    fn health(&self) -> Result<HealthStatus, ClusterError>;
    /// Initialize an uninitialized store. Returns the only copy of the key
    /// material that will ever exist.
    fn initialize(&self, shares: u32, threshold: u32) -> Result<KeyMaterial, ClusterError>;
    /// Submit one unseal key. Returns whether the store is still sealed.
    fn unseal(&self, key: &str) -> Result<bool, ClusterError>;
    /// Enable a KV v2 mount at `path`, authenticated with `token`.
    fn enable_kv_mount(&self, token: &str, path: &str) -> Result<(), ClusterError>;
    /// Whether a mount already exists at `path`. Enabling twice is an error
    /// on the store side, so callers check before enabling.
    fn kv_mount_exists(&self, token: &str, path: &str) -> Result<bool, ClusterError>;
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    initialized: bool,
    #[serde(default)]
    sealed: bool,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    keys: Vec<String>,
    root_token: String,
}

#[derive(Debug, Deserialize)]
struct UnsealResponse {
    sealed: bool,
}

/// [`SecretStoreApi`] over the Vault-compatible HTTP API.
pub struct HttpSecretStore {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSecretStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    fn read_body(resp: ureq::http::Response<ureq::Body>) -> Result<Vec<u8>, ClusterError> {
        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| ClusterError::Api(e.to_string()))?;
        Ok(body)
    }

    fn put_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        token: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<T, ClusterError> {
        let url = self.url(path);
        let data = serde_json::to_vec(payload)?;
        let mut req = self
            .agent
            .put(&url)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            req = req.header("X-Vault-Token", token);
        }
        let resp = req
            .send(&data as &[u8])
            .map_err(|e| ClusterError::Api(format!("PUT {url}: {e}")))?;
        let body = Self::read_body(resp)?;
        serde_json::from_slice(&body)
            .map_err(|e| ClusterError::Api(format!("unparseable response from {url}: {e}")))
    }
}

impl SecretStoreApi for HttpSecretStore {
    fn health(&self) -> Result<HealthStatus, ClusterError> {
        let url = self.url("sys/health");
        // The health endpoint encodes state in the status code: 200 when
        // initialized and unsealed, 429 for an unsealed standby, 501 when
        // uninitialized, 503 when sealed. All of those are "reachable".
        match self.agent.get(&url).call() {
            Ok(resp) => {
                let body = Self::read_body(resp)?;
                let health: HealthResponse = serde_json::from_slice(&body)
                    .map_err(|e| ClusterError::Api(format!("unparseable health response: {e}")))?;
                Ok(HealthStatus {
                    initialized: health.initialized,
                    sealed: health.sealed,
                })
            }
            Err(ureq::Error::StatusCode(429)) => Ok(HealthStatus {
                initialized: true,
                sealed: false,
            }),
            Err(ureq::Error::StatusCode(501)) => Ok(HealthStatus {
                initialized: false,
                sealed: true,
            }),
            Err(ureq::Error::StatusCode(503)) => Ok(HealthStatus {
                initialized: true,
                sealed: true,
            }),
            Err(ureq::Error::StatusCode(code)) => {
                Err(ClusterError::Api(format!("HTTP {code} for {url}")))
            }
            Err(e) => Err(ClusterError::Api(e.to_string())),
        }
    }

    fn initialize(&self, shares: u32, threshold: u32) -> Result<KeyMaterial, ClusterError> {
        debug!(shares, threshold, "initializing secret store");
        let resp: InitResponse = self.put_json(
            "sys/init",
            None,
            &serde_json::json!({
                "secret_shares": shares,
                "secret_threshold": threshold,
            }),
        )?;
        Ok(KeyMaterial {
            root_token: resp.root_token,
            unseal_keys: resp.keys,
            shares,
            threshold,
        })
    }

    fn unseal(&self, key: &str) -> Result<bool, ClusterError> {
        let resp: UnsealResponse =
            self.put_json("sys/unseal", None, &serde_json::json!({ "key": key }))?;
        Ok(resp.sealed)
    }

    fn enable_kv_mount(&self, token: &str, path: &str) -> Result<(), ClusterError> {
        let url = self.url(&format!("sys/mounts/{path}"));
        let data = serde_json::to_vec(&serde_json::json!({
            "type": "kv",
            "options": { "version": "2" },
        }))?;
        self.agent
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Vault-Token", token)
            .send(&data as &[u8])
            .map_err(|e| ClusterError::Api(format!("POST {url}: {e}")))?;
        Ok(())
    }

    fn kv_mount_exists(&self, token: &str, path: &str) -> Result<bool, ClusterError> {
        let url = self.url("sys/mounts");
        let resp = self
            .agent
            .get(&url)
            .header("X-Vault-Token", token)
            .call()
            .map_err(|e| ClusterError::Api(format!("GET {url}: {e}")))?;
        let body = Self::read_body(resp)?;
        let mounts: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ClusterError::Api(format!("unparseable mounts response: {e}")))?;
        // Mount paths carry a trailing slash; newer servers nest them under
        // "data" while older ones report them at the top level.
        let key = format!("{path}/");
        Ok(mounts.get(key.as_str()).is_some() || mounts["data"].get(key.as_str()).is_some())
    }
}

/// On-disk storage for key material, one directory per cluster.
///
/// Layout: `<root>/<cluster>/keys.json`, file mode 0600 inside a 0700
/// directory. A `.lock` file in the cluster directory serializes concurrent
/// bootstrap attempts.
pub struct KeyStore {
    root: PathBuf,
}

impl KeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn keys_path(&self, cluster: &str) -> PathBuf {
        self.root.join(cluster).join("keys.json")
    }

    pub fn exists(&self, cluster: &str) -> bool {
        self.keys_path(cluster).is_file()
    }

    pub fn load(&self, cluster: &str) -> Result<KeyMaterial, ClusterError> {
        let bytes = std::fs::read(self.keys_path(cluster))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Persist key material atomically: write to a sibling temp file with
    /// restrictive permissions already set, then rename over the target.
    pub fn save(&self, cluster: &str, material: &KeyMaterial) -> Result<(), ClusterError> {
        let dir = self.root.join(cluster);
        create_private_dirs(&dir)?;

        let path = self.keys_path(cluster);
        let tmp = dir.join("keys.json.tmp");
        write_private_file(&tmp, &serde_json::to_vec_pretty(material)?)?;
        std::fs::rename(&tmp, &path)?;
        info!(path = %path.display(), "persisted secret store key material");
        Ok(())
    }

    /// Take an exclusive advisory lock on the cluster's key directory.
    /// The lock is released when the returned file handle drops.
    pub fn lock(&self, cluster: &str) -> Result<std::fs::File, ClusterError> {
        let dir = self.root.join(cluster);
        create_private_dirs(&dir)?;
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(".lock"))?;
        lock_file.lock_exclusive()?;
        Ok(lock_file)
    }
}

#[cfg(unix)]
fn create_private_dirs(dir: &Path) -> Result<(), ClusterError> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dirs(dir: &Path) -> Result<(), ClusterError> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), ClusterError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), ClusterError> {
    std::fs::write(path, contents)?;
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Wait until the store's API answers health queries at all.
fn wait_for_api(
    api: &dyn SecretStoreApi,
    timeout: Duration,
    tick: Duration,
    cancel: &dyn Fn() -> bool,
) -> Result<HealthStatus, ClusterError> {
    let bar = spinner("waiting for secret store API");
    let deadline = Instant::now() + timeout;
    let result = loop {
        if cancel() {
            break Err(ClusterError::Cancelled);
        }
        match api.health() {
            Ok(health) => break Ok(health),
            Err(err) => {
                debug!(%err, "secret store not reachable yet");
                if Instant::now() >= deadline {
                    break Err(ClusterError::Timeout {
                        what: "secret store API".to_string(),
                        waited_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(tick);
            }
        }
    };
    bar.finish_and_clear();
    result
}

/// Submit unseal keys in the order they were issued until the store opens.
fn unseal_with(api: &dyn SecretStoreApi, material: &KeyMaterial) -> Result<(), ClusterError> {
    for key in &material.unseal_keys {
        if !api.unseal(key)? {
            info!("secret store unsealed");
            return Ok(());
        }
    }
    Err(ClusterError::Api(
        "store still sealed after submitting all local unseal keys".to_string(),
    ))
}

/// Bring the secret store from whatever state it is in to initialized,
/// unsealed, and carrying the default KV mount.
///
/// First boot initializes with [`DEFAULT_KEY_SHARES`]/[`DEFAULT_KEY_THRESHOLD`]
/// and persists the key material before submitting any unseal key. On later
/// boots the store is unsealed from the stored material. A store that reports
/// initialized while no local key material exists cannot be recovered
/// automatically and is reported as requiring manual intervention.
pub fn bootstrap_secret_store(
    api: &dyn SecretStoreApi,
    key_store: &KeyStore,
    cluster: &str,
    timeout: Duration,
    tick: Duration,
    cancel: &dyn Fn() -> bool,
) -> Result<(), ClusterError> {
    let health = wait_for_api(api, timeout, tick, cancel)?;
    let _guard = key_store.lock(cluster)?;

    if key_store.exists(cluster) {
        let material = key_store.load(cluster)?;
        if health.sealed {
            info!(cluster, "unsealing from stored key material");
            unseal_with(api, &material)?;
        } else {
            debug!(cluster, "store already unsealed");
        }
        // A previous run may have been interrupted between unsealing and
        // enabling the mount, so the mount is converged on every pass.
        return ensure_kv_mount(api, &material);
    }

    if health.initialized {
        warn!(cluster, "store initialized but no local key material present");
        return Err(ClusterError::ManualInterventionRequired(format!(
            "secret store for cluster '{cluster}' is already initialized but no key material \
             exists at {}. Manual recovery required: restore keys.json from backup, or reset \
             the store's storage backend and re-run bootstrap",
            key_store.keys_path(cluster).display(),
        )));
    }

    info!(cluster, "first boot, initializing secret store");
    let material = api.initialize(DEFAULT_KEY_SHARES, DEFAULT_KEY_THRESHOLD)?;
    // Persist before the first unseal: after this point the API will never
    // hand out these keys again.
    key_store.save(cluster, &material)?;
    unseal_with(api, &material)?;
    ensure_kv_mount(api, &material)
}

/// Enable [`DEFAULT_KV_MOUNT`] unless it already exists.
fn ensure_kv_mount(api: &dyn SecretStoreApi, material: &KeyMaterial) -> Result<(), ClusterError> {
    if api.kv_mount_exists(&material.root_token, DEFAULT_KV_MOUNT)? {
        return Ok(());
    }
    info!(mount = DEFAULT_KV_MOUNT, "enabling KV mount");
    api.enable_kv_mount(&material.root_token, DEFAULT_KV_MOUNT)
}
