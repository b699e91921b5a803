//! Component orchestration substrate for Holdfast.
//!
//! Defines the uniform lifecycle contract every infrastructure service
//! implements, the thread-safe registry holding them, the typed accessors
//! over the string-keyed install config, and the dependency resolver that
//! computes a safe installation order.

pub mod component;
pub mod config;
pub mod registry;
pub mod resolver;

pub use component::{Component, ComponentStatus};
pub use config::InstallConfig;
pub use registry::Registry;
pub use resolver::{
    has_circular_dependencies, resolve_installation_order, validate_dependencies,
};

use thiserror::Error;

/// Error taxonomy for the orchestration substrate. Classification is by
/// variant; the rendered message substrings ("not found in registry",
/// "already registered", "circular dependency", "missing dependencies") are
/// part of the user-facing contract and covered by tests.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("component '{0}' not found in registry")]
    NotFound(String),
    #[error("component '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("circular dependency detected involving component '{0}'")]
    CircularDependency(String),
    #[error("missing dependencies:\n{0}")]
    MissingDependencies(String),
    #[error("registry lock poisoned")]
    LockPoisoned,
    #[error(transparent)]
    Exec(#[from] holdfast_exec::ExecError),
    #[error(transparent)]
    Systemd(#[from] holdfast_systemd::SystemdError),
    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync + 'static>),
}
