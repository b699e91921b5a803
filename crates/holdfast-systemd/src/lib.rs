//! Systemd supervision for Holdfast host services.
//!
//! Renders `[Unit]/[Service]/[Install]` unit files, writes them through the
//! remote executor, and drives enable/start/stop/status plus bounded
//! wait-for-state polling over `systemctl`.

pub mod manager;
pub mod unit;

pub use manager::{ServiceStatus, SystemdManager};
pub use unit::ServiceUnit;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystemdError {
    #[error(transparent)]
    Exec(#[from] holdfast_exec::ExecError),
    #[error("service '{unit}' did not reach state '{target}' within {waited_secs}s")]
    Timeout {
        unit: String,
        target: String,
        waited_secs: u64,
    },
    #[error("wait for service '{unit}' cancelled")]
    Cancelled { unit: String },
}
