//! Fleet configuration file: the one place untyped user input enters the
//! system. Parsed strictly here, then handed to components as typed
//! [`InstallConfig`] bags.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use holdfast_component::InstallConfig;
use holdfast_exec::{Executor, LocalExecutor, SshExecutor};

/// Parsed `holdfast.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Per-component install settings, keyed by component name. Forwarded
    /// to the component untouched.
    #[serde(default)]
    pub components: HashMap<String, toml::Value>,
}

/// Where commands execute. No host means the local machine.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_name")]
    pub name: String,
    #[serde(default = "default_secret_store_addr")]
    pub secret_store_addr: String,
    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,
    /// `minio` or `seaweedfs`.
    #[serde(default = "default_backup_backend")]
    pub backup_backend: String,
}

fn default_cluster_name() -> String {
    "default".to_owned()
}

fn default_secret_store_addr() -> String {
    "http://127.0.0.1:8200".to_owned()
}

fn default_keys_dir() -> String {
    "/var/lib/holdfast/keys".to_owned()
}

fn default_backup_backend() -> String {
    "minio".to_owned()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            secret_store_addr: default_secret_store_addr(),
            keys_dir: default_keys_dir(),
            backup_backend: default_backup_backend(),
        }
    }
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("config error: failed to read {}: {e}", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("config error: {e}"))
    }

    /// Missing file is not an error: everything has defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Executor for the configured target.
    pub fn executor(&self) -> Arc<dyn Executor> {
        match &self.target.host {
            None => Arc::new(LocalExecutor::new()),
            Some(host) => {
                let mut ssh = SshExecutor::new(host);
                if let Some(user) = &self.target.user {
                    ssh = ssh.user(user);
                }
                if let Some(port) = self.target.port {
                    ssh = ssh.port(port);
                }
                if let Some(identity) = &self.target.identity_file {
                    ssh = ssh.identity_file(identity);
                }
                Arc::new(ssh)
            }
        }
    }

    /// Install settings for one component, with the cluster name injected so
    /// components that track per-cluster state see the right one.
    pub fn install_config(&self, component: &str) -> InstallConfig {
        let mut config = match self.components.get(component) {
            Some(toml::Value::Table(table)) => {
                let values = table
                    .iter()
                    .map(|(k, v)| (k.clone(), toml_to_json(v.clone())))
                    .collect();
                InstallConfig::from_values(values)
            }
            _ => InstallConfig::new(),
        };
        config.insert("cluster", serde_json::Value::String(self.cluster.name.clone()));
        config
    }
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::Value::from(i),
        toml::Value::Float(f) => {
            serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
