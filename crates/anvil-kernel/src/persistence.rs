//! On-disk form of the resolved configuration.
//!
//! The file is TOML, one table per `module.option`:
//!
//! ```toml
//! [inventory.chest_side]
//! value = "left"
//! default = "top"
//! type = "string"
//! description = "Side of the input chest"
//! ```
//!
//! Only `value` is read back during resolution; the remaining fields are
//! metadata for whoever edits the file by hand.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anvil_types::{KernelError, OptionType, Value};
use serde::{Deserialize, Serialize};

use crate::config_store::ResolvedOption;

/// One persisted option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOption {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<OptionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PersistedOption {
    /// A bare value without metadata.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            default: None,
            ty: None,
            description: None,
        }
    }
}

impl From<&ResolvedOption> for PersistedOption {
    fn from(option: &ResolvedOption) -> Self {
        Self {
            value: option.value.clone(),
            default: Some(option.spec.default.clone()),
            ty: Some(option.spec.ty),
            description: Some(option.spec.description.clone()),
        }
    }
}

/// `module id -> option name -> persisted option`.
pub type Persisted = BTreeMap<String, BTreeMap<String, PersistedOption>>;

/// Read the persisted file.  A missing file is an empty mapping.
pub fn load_from(path: &Path) -> Result<Persisted, KernelError> {
    if !path.exists() {
        return Ok(Persisted::new());
    }
    let raw = fs::read_to_string(path).map_err(|e| persistence_error(path, e))?;
    toml::from_str(&raw).map_err(|e| KernelError::Serialization(format!("{}: {e}", path.display())))
}

/// Write `persisted` to `path`, creating the parent directory if necessary.
///
/// On Unix the directory is restricted to the owner (`0o700`) and the file to
/// owner read/write (`0o600`).
pub fn save_to(persisted: &Persisted, path: &Path) -> Result<(), KernelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persistence_error(parent, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| persistence_error(parent, e))?;
        }
    }
    let raw = toml::to_string_pretty(persisted)
        .map_err(|e| KernelError::Serialization(e.to_string()))?;
    write_private(path, raw.as_bytes()).map_err(|e| persistence_error(path, e))
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}

fn persistence_error(path: &Path, e: std::io::Error) -> KernelError {
    KernelError::Persistence {
        path: path.display().to_string(),
        details: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Persisted {
        let mut inventory = BTreeMap::new();
        inventory.insert(
            "chest_side".to_string(),
            PersistedOption {
                value: Value::from("left"),
                default: Some(Value::from("top")),
                ty: Some(OptionType::String),
                description: Some("Side of the input chest".to_string()),
            },
        );
        let mut origin = BTreeMap::new();
        origin.insert("x".to_string(), Value::Number(3.0));
        inventory.insert("origin".to_string(), PersistedOption::value(Value::Table(origin)));

        let mut persisted = Persisted::new();
        persisted.insert("inventory".to_string(), inventory);
        persisted
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let loaded = load_from(&dir.path().join("config.toml")).expect("no error");
        assert!(loaded.is_empty());
    }

    #[test]
    fn save_then_load_keeps_values_and_metadata() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("config.toml");
        save_to(&sample(), &path).expect("save");

        let loaded = load_from(&path).expect("load");
        assert_eq!(loaded, sample());
    }

    #[test]
    fn hand_written_file_without_metadata_loads() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[grid.width]\nvalue = \"5\"\n").unwrap();

        let loaded = load_from(&path).expect("load");
        assert_eq!(loaded["grid"]["width"].value, Value::from("5"));
        assert!(loaded["grid"]["width"].ty.is_none());
    }

    #[test]
    fn malformed_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[grid\nvalue = ").unwrap();
        assert!(matches!(load_from(&path), Err(KernelError::Serialization(_))));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join(".anvil").join("config.toml");
        save_to(&sample(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
