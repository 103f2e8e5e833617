//! Crash reports for unrecovered task failures.
//!
//! A [`CrashReport`] is plain text with fixed sections:
//!
//! ```text
//! === anvil crash report ===
//! report: 5b7c...
//! generated: 2026-10-18T09:12:44Z
//! modules: 3
//!
//! [modules]
//!   inventory 1.4.0
//! ! crafting 0.9.2
//!   ui 2.0.0
//!
//! [error]
//! recipe 'torch' has no ingredients
//!
//! [trace]
//! planner step 2
//! resume #14 of 'crafting' on 'timer' event (cycle 14)
//! ```
//!
//! Writing is best effort; the caller exits the process either way.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anvil_types::KernelError;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::module::ModuleInfo;
use crate::scheduler::TaskFailure;

/// One loaded module as listed in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashEntry {
    pub id: String,
    pub version: String,
    pub culprit: bool,
}

#[derive(Debug, Clone)]
pub struct CrashReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub modules: Vec<CrashEntry>,
    pub error: String,
    pub trace: Vec<String>,
}

impl CrashReport {
    /// Build a report for `failure` over the loaded `modules`.
    pub fn new(modules: &[ModuleInfo], failure: &TaskFailure) -> Self {
        let modules = modules
            .iter()
            .map(|m| CrashEntry {
                id: m.id.clone(),
                version: m.version.clone(),
                culprit: m.id == failure.module_id,
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            modules,
            error: failure.error.message.clone(),
            trace: failure.error.trace.clone(),
        }
    }

    pub fn culprit(&self) -> Option<&CrashEntry> {
        self.modules.iter().find(|m| m.culprit)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== anvil crash report ===");
        let _ = writeln!(out, "report: {}", self.id);
        let _ = writeln!(
            out,
            "generated: {}",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(out, "modules: {}", self.modules.len());

        let _ = writeln!(out, "\n[modules]");
        for entry in &self.modules {
            let marker = if entry.culprit { "!" } else { " " };
            let _ = writeln!(out, "{marker} {} {}", entry.id, entry.version);
        }

        let _ = writeln!(out, "\n[error]");
        let _ = writeln!(out, "{}", self.error);

        let _ = writeln!(out, "\n[trace]");
        for frame in &self.trace {
            let _ = writeln!(out, "{frame}");
        }
        out
    }
}

/// Writes crash reports to a fixed path, replacing any previous report.
#[derive(Debug, Clone)]
pub struct CrashReporter {
    path: PathBuf,
}

impl CrashReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `report`, creating the parent directory if needed.
    pub fn write(&self, report: &CrashReport) -> Result<PathBuf, KernelError> {
        let persistence_error = |path: &Path, e: std::io::Error| KernelError::Persistence {
            path: path.display().to_string(),
            details: e.to_string(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;
        }
        fs::write(&self.path, report.render()).map_err(|e| persistence_error(&self.path, e))?;
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskError;

    fn modules() -> Vec<ModuleInfo> {
        ["inventory", "crafting", "ui"]
            .into_iter()
            .map(|id| ModuleInfo {
                id: id.to_string(),
                version: "1.0".to_string(),
            })
            .collect()
    }

    fn failure(module: &str) -> TaskFailure {
        TaskFailure {
            module_id: module.to_string(),
            error: TaskError::new("no ingredients").with_frame("planner step 2"),
            cycle: 3,
            event_kind: "timer".to_string(),
        }
    }

    #[test]
    fn exactly_one_culprit() {
        let report = CrashReport::new(&modules(), &failure("crafting"));
        assert_eq!(report.modules.len(), 3);
        assert_eq!(report.modules.iter().filter(|m| m.culprit).count(), 1);
        assert_eq!(report.culprit().unwrap().id, "crafting");
    }

    #[test]
    fn render_has_fixed_sections() {
        let text = CrashReport::new(&modules(), &failure("ui")).render();
        assert!(text.starts_with("=== anvil crash report ===\n"));
        assert!(text.contains("modules: 3\n"));
        assert!(text.contains("\n  inventory 1.0\n"));
        assert!(text.contains("\n! ui 1.0\n"));
        assert!(text.contains("[error]\nno ingredients\n"));
        assert!(text.contains("[trace]\nplanner step 2\n"));
    }

    #[test]
    fn write_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let reporter = CrashReporter::new(dir.path().join("logs").join("crash.txt"));
        let report = CrashReport::new(&modules(), &failure("inventory"));
        let written = reporter.write(&report).expect("write");
        let text = fs::read_to_string(written).unwrap();
        assert!(text.contains("! inventory 1.0"));
    }

    #[test]
    fn unwritable_path_is_a_persistence_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let reporter = CrashReporter::new(blocker.join("crash.txt"));
        let report = CrashReport::new(&modules(), &failure("ui"));
        assert!(matches!(reporter.write(&report), Err(KernelError::Persistence { .. })));
    }
}
