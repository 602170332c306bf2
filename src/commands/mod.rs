pub mod merge;
pub mod status;

use crate::chatlog::client_dir::ClientDirStorage;
use crate::chatlog::clients::{DirResolver, ProcessEnv, resolve_clients};
use crate::chatlog::config::SlMergeConfig;
use crate::chatlog::warn::{self, WarnEvent};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{}: {}\n",
            self.command,
            if self.ok { "ok" } else { "failed" }
        );
        for detail in &self.details {
            out.push_str(&format!("  {detail}\n"));
        }
        for issue in &self.issues {
            out.push_str(&format!("  issue: {issue}\n"));
        }
        out
    }
}

pub fn discover_clients(cfg: &SlMergeConfig, report: &mut CommandReport) -> Vec<ClientDirStorage> {
    let reserved = cfg.reserved_names();
    let mut out = Vec::new();
    for (kind, resolved) in resolve_clients(&cfg.client_kinds(), DirResolver::host(), &ProcessEnv)
    {
        let dir = match resolved {
            Ok(dir) => dir,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "CLIENT_DETECTION_FAILED",
                    stage: "discover",
                    action: "resolve-settings-dir",
                    storage: kind.name(),
                    reason: "skipping-client",
                    err: &err.to_string(),
                    ..WarnEvent::default()
                });
                continue;
            }
        };
        if dir.is_dir() {
            report.detail(format!("client.{}={} (found)", kind.name(), dir.display()));
            out.push(ClientDirStorage::new(kind.name(), dir, reserved.clone()));
        } else if dir.exists() {
            warn::emit(WarnEvent {
                code: "CLIENT_DETECTION_FAILED",
                stage: "discover",
                action: "resolve-settings-dir",
                storage: kind.name(),
                reason: "not-a-directory",
                err: &dir.display().to_string(),
                ..WarnEvent::default()
            });
        } else {
            report.detail(format!("client.{}={} (absent)", kind.name(), dir.display()));
        }
    }
    out
}
