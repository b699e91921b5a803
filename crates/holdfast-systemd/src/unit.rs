use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Description of a systemd-managed process, rendered to unit-file text.
///
/// A value object only: once written to the remote filesystem the unit is
/// not tracked in memory. List fields render space-joined, the environment
/// map renders as repeated `Environment=` lines (BTreeMap keeps the output
/// deterministic), and zero or blank fields are omitted entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUnit {
    pub description: String,
    pub after: Vec<String>,
    pub wants: Vec<String>,
    pub service_type: String,
    pub user: String,
    pub working_directory: String,
    pub environment: BTreeMap<String, String>,
    pub exec_start_pre: String,
    pub exec_start: String,
    pub exec_start_post: String,
    pub exec_stop: String,
    pub restart: String,
    pub restart_sec: u32,
    pub timeout_start_sec: u32,
    pub wanted_by: String,
}

impl ServiceUnit {
    /// A long-running service restarted on failure, wanted by
    /// multi-user.target. Callers fill in the exec lines.
    pub fn daemon(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            restart: "on-failure".to_owned(),
            wanted_by: "multi-user.target".to_owned(),
            ..Self::default()
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("[Unit]\n");
        push_field(&mut out, "Description", &self.description);
        push_field(&mut out, "After", &self.after.join(" "));
        push_field(&mut out, "Wants", &self.wants.join(" "));

        out.push_str("\n[Service]\n");
        push_field(&mut out, "Type", &self.service_type);
        push_field(&mut out, "User", &self.user);
        push_field(&mut out, "WorkingDirectory", &self.working_directory);
        for (key, value) in &self.environment {
            let _ = writeln!(out, "Environment=\"{key}={value}\"");
        }
        push_field(&mut out, "ExecStartPre", &self.exec_start_pre);
        push_field(&mut out, "ExecStart", &self.exec_start);
        push_field(&mut out, "ExecStartPost", &self.exec_start_post);
        push_field(&mut out, "ExecStop", &self.exec_stop);
        push_field(&mut out, "Restart", &self.restart);
        if self.restart_sec > 0 {
            let _ = writeln!(out, "RestartSec={}", self.restart_sec);
        }
        if self.timeout_start_sec > 0 {
            let _ = writeln!(out, "TimeoutStartSec={}", self.timeout_start_sec);
        }

        if !self.wanted_by.is_empty() {
            out.push_str("\n[Install]\n");
            let _ = writeln!(out, "WantedBy={}", self.wanted_by);
        }
        out
    }
}

fn push_field(out: &mut String, key: &str, value: &str) {
    if !value.is_empty() {
        let _ = writeln!(out, "{key}={value}");
    }
}
