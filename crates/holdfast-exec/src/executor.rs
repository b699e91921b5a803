use crate::ExecError;
use std::process::Command;
use tracing::debug;

/// Captured result of a remote command. A non-zero exit code is data, not an
/// error: callers that require success use [`run_checked`].
///
/// [`run_checked`]: ExecutorExt::run_checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr concatenated, for error reporting.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// The single capability all host interaction funnels through.
///
/// Implementations run one shell command on a target and report its output.
/// Keeping the surface this narrow keeps install logic transport-agnostic:
/// SSH today, anything that can run a command tomorrow. No transport-level
/// timeout is enforced here; bounded waits live above the command level.
pub trait Executor: Send + Sync {
    fn run(&self, command: &str) -> Result<ExecOutput, ExecError>;

    /// Human-readable target, for logs and error messages.
    fn target(&self) -> String;
}

/// Blanket helpers over any [`Executor`].
pub trait ExecutorExt: Executor {
    /// Run a command and convert a non-zero exit into `CommandFailed`.
    fn run_checked(&self, command: &str) -> Result<ExecOutput, ExecError> {
        let output = self.run(command)?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExecError::CommandFailed {
                command: command.to_owned(),
                exit_code: output.exit_code,
                stderr: output.combined(),
            })
        }
    }
}

impl<E: Executor + ?Sized> ExecutorExt for E {}

fn output_from(command: &str, raw: &std::process::Output) -> ExecOutput {
    let exit_code = raw.status.code().unwrap_or(-1);
    debug!("'{command}' exited {exit_code}");
    ExecOutput {
        stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
        exit_code,
    }
}

/// Runs commands on the local host through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for LocalExecutor {
    fn run(&self, command: &str) -> Result<ExecOutput, ExecError> {
        debug!("local: {command}");
        let raw = Command::new("sh").arg("-c").arg(command).output()?;
        Ok(output_from(command, &raw))
    }

    fn target(&self) -> String {
        "localhost".to_owned()
    }
}

/// Runs commands on a remote host by shelling out to the `ssh` binary.
///
/// Batch mode is forced so a missing key fails fast instead of prompting.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    identity_file: Option<String>,
}

impl SshExecutor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn identity_file(mut self, path: impl Into<String>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

impl Executor for SshExecutor {
    fn run(&self, command: &str) -> Result<ExecOutput, ExecError> {
        debug!("ssh {}: {command}", self.destination());
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.destination());
        cmd.arg(command);
        let raw = cmd.output()?;
        Ok(output_from(command, &raw))
    }

    fn target(&self) -> String {
        self.destination()
    }
}
