//! Remote execution and container runtime management for Holdfast hosts.
//!
//! This crate implements the host interaction layer: a narrow `Executor`
//! capability (run a command, get stdout/stderr/exit code) with local, SSH,
//! and scripted implementations, container runtime classification on top of
//! it, and the idempotent bootstrap/repair path that brings a bare host to a
//! working Docker-compatible runtime with CNI bridge networking.

pub mod bootstrap;
pub mod executor;
pub mod runtime;
pub mod scripted;

pub use bootstrap::{ensure_cni_config, install_runtime, restart_bridge_dependents, RuntimeAction};
pub use executor::{ExecOutput, Executor, ExecutorExt, LocalExecutor, SshExecutor};
pub use runtime::{detect_runtime, RuntimeKind};
pub use scripted::ScriptedExecutor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("exec I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command '{command}' exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("bootstrap step {step} ({description}) failed: {output}")]
    StepFailed {
        step: usize,
        description: String,
        output: String,
    },
    #[error("no usable container runtime on host: {0}")]
    RuntimeUnavailable(String),
    #[error("failed to restart bridge-dependent services:\n{0}")]
    RestartsFailed(String),
}
