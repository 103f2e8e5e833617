//! Where the kernel keeps its files.
//!
//! Defaults live under `~/.anvil/`; each path can be overridden through the
//! environment.

use std::path::{Path, PathBuf};

const CONFIG_PATH_VAR: &str = "ANVIL_CONFIG_PATH";
const CRASH_PATH_VAR: &str = "ANVIL_CRASH_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelPaths {
    /// Persisted module settings.
    pub config_path: PathBuf,
    /// Crash report written on an unrecovered task failure.
    pub crash_path: PathBuf,
}

impl KernelPaths {
    /// Resolve from `HOME` (or `USERPROFILE`) and the override variables.
    pub fn from_env() -> Self {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        Self::resolve(Path::new(&home), |name| std::env::var(name).ok())
    }

    /// Resolve against `home`, consulting `lookup` for overrides.  Empty
    /// override values are ignored.
    pub(crate) fn resolve(home: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = home.join(".anvil");
        let pick = |var: &str, default: PathBuf| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };
        Self {
            config_path: pick(CONFIG_PATH_VAR, base.join("config.toml")),
            crash_path: pick(CRASH_PATH_VAR, base.join("crash.txt")),
        }
    }
}
