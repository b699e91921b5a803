use crate::executor::{ExecOutput, Executor};
use crate::ExecError;
use std::sync::Mutex;

/// In-memory executor for tests: commands are matched against scripted
/// responses by prefix, in registration order. Unscripted commands fail with
/// exit code 127 so probes fail closed instead of accidentally succeeding.
///
/// Every command is recorded, so tests can assert exactly which remote
/// operations an install performed (or did not perform).
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Vec<(String, ExecOutput)>,
    log: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for any command starting with `prefix`.
    pub fn respond(mut self, prefix: impl Into<String>, output: ExecOutput) -> Self {
        self.responses.push((prefix.into(), output));
        self
    }

    /// Script a successful response with the given stdout.
    pub fn respond_ok(self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.respond(
            prefix,
            ExecOutput {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_code: 0,
            },
        )
    }

    /// Script a failing response with the given exit code and stderr.
    pub fn respond_err(
        self,
        prefix: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        self.respond(
            prefix,
            ExecOutput {
                stdout: String::new(),
                stderr: stderr.into(),
                exit_code,
            },
        )
    }

    /// All commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of recorded commands matching the prefix.
    pub fn count_matching(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl Executor for ScriptedExecutor {
    fn run(&self, command: &str) -> Result<ExecOutput, ExecError> {
        self.log
            .lock()
            .map_err(|e| ExecError::RuntimeUnavailable(format!("mutex poisoned: {e}")))?
            .push(command.to_owned());

        for (prefix, output) in &self.responses {
            if command.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(ExecOutput {
            stdout: String::new(),
            stderr: format!("unscripted command: {command}"),
            exit_code: 127,
        })
    }

    fn target(&self) -> String {
        "scripted".to_owned()
    }
}
