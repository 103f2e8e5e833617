//! [`ConfigStore`] – typed per-module settings.
//!
//! # Resolution
//!
//! [`ConfigStore::resolve`] derives a value for every declared option:
//!
//! 1. The candidate is the persisted value when one is present, otherwise the
//!    declared default.  A present value is always used, whatever it holds.
//! 2. A candidate of the declared type is accepted.
//! 3. Otherwise, when the module offers a `setup` hook, the hook is run once
//!    with the module's whole config slice and must fix every mismatch.  A
//!    mismatch that survives the hook aborts bootstrap.
//! 4. Otherwise the operator is prompted through the injected [`InputPort`]
//!    until a value of the right type is entered.
//!
//! After resolution every option satisfies `ty.matches(value)`.
//!
//! # Mutation
//!
//! [`ConfigStore::set`] is the only runtime write path.  It coerces the new
//! value with [`ResolvedOption::coerce`] and persists the store on success.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anvil_types::{KernelError, OptionType, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::input::InputPort;
use crate::module::SetupOutcome;
use crate::persistence::{self, Persisted, PersistedOption};
use crate::registry::Registry;

// ────────────────────────────────────────────────────────────────────────────
// Option specs
// ────────────────────────────────────────────────────────────────────────────

/// A declared option: its default, its type, and what it is for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub default: Value,
    #[serde(rename = "type")]
    pub ty: OptionType,
    pub description: String,
}

impl OptionSpec {
    pub fn new(ty: OptionType, default: impl Into<Value>, description: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            ty,
            description: description.into(),
        }
    }
}

/// Declared options of one module, keyed by option name.
pub type ConfigSpec = BTreeMap<String, OptionSpec>;

/// An option after resolution: its declaration, owner, name, and value.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOption {
    pub owner: String,
    pub name: String,
    pub spec: OptionSpec,
    pub value: Value,
}

impl ResolvedOption {
    pub fn ty(&self) -> OptionType {
        self.spec.ty
    }

    /// `true` when the current value has the declared type.
    pub fn is_valid(&self) -> bool {
        self.spec.ty.matches(&self.value)
    }

    /// Coerce `value` to this option's type.
    ///
    /// Rules, tried in order:
    /// 1. a value already of the declared type is accepted as is;
    /// 2. a `number` option accepts a numeric string, parsed;
    /// 3. a `table` option accepts a non-empty structured literal string,
    ///    deserialized.
    ///
    /// Anything else is rejected with `None`.
    ///
    /// ```
    /// use anvil_kernel::config_store::{OptionSpec, ResolvedOption};
    /// use anvil_types::{OptionType, Value};
    ///
    /// let spec = OptionSpec::new(OptionType::Number, 0i64, "Slots to keep free");
    /// let opt = ResolvedOption { owner: "inventory".into(), name: "reserve".into(),
    ///                            value: spec.default.clone(), spec };
    /// assert_eq!(opt.coerce(Value::from("4")), Some(Value::Number(4.0)));
    /// assert_eq!(opt.coerce(Value::from("four")), None);
    /// ```
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if self.spec.ty.matches(&value) {
            return Some(value);
        }
        match (self.spec.ty, &value) {
            (OptionType::Number, Value::String(s)) => Value::parse_number(s).map(Value::Number),
            (OptionType::Table, Value::String(s)) => Value::parse_literal(s),
            _ => None,
        }
    }

    /// Apply `value` through [`coerce`](Self::coerce).  Returns `false`, and
    /// leaves the option untouched, when coercion fails.
    pub fn set(&mut self, value: Value) -> bool {
        match self.coerce(value) {
            Some(v) => {
                self.value = v;
                true
            }
            None => false,
        }
    }
}

/// Resolved options of one module, keyed by option name.
pub type ModuleConfig = BTreeMap<String, ResolvedOption>;

// ────────────────────────────────────────────────────────────────────────────
// ConfigStore
// ────────────────────────────────────────────────────────────────────────────

/// Resolved configuration of every loaded module.
#[derive(Debug, Default, Clone)]
pub struct ConfigStore {
    modules: BTreeMap<String, ModuleConfig>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// An empty store that is never persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist to `path` on every [`save`](Self::save).
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resolve every option of every module in `registry`.
    ///
    /// Modules are visited in registration order and options in name order,
    /// so the sequence of operator prompts is deterministic.
    ///
    /// # Errors
    ///
    /// [`KernelError::SetupContract`] when a `setup` hook leaves an option
    /// mistyped, or whatever the [`InputPort`] fails with.
    pub fn resolve(
        registry: &Registry,
        persisted: &Persisted,
        input: &mut dyn InputPort,
    ) -> Result<Self, KernelError> {
        let mut store = Self::new();
        for module in registry.iter() {
            let id = module.id();
            let spec = module.config_spec();
            if spec.is_empty() {
                continue;
            }
            let stored = persisted.get(id);

            let mut slice: ModuleConfig = spec
                .iter()
                .map(|(name, option)| {
                    let value = stored
                        .and_then(|s| s.get(name))
                        .map(|p| p.value.clone())
                        .unwrap_or_else(|| option.default.clone());
                    let resolved = ResolvedOption {
                        owner: id.to_string(),
                        name: name.clone(),
                        spec: option.clone(),
                        value,
                    };
                    (name.clone(), resolved)
                })
                .collect();

            let mismatched: Vec<String> = slice
                .values()
                .filter(|o| !o.is_valid())
                .map(|o| o.name.clone())
                .collect();

            if !mismatched.is_empty() {
                let before = slice.clone();
                match module.setup(&mut slice) {
                    SetupOutcome::Ran => {
                        info!(module = %id, options = ?mismatched, "setup hook repaired config");
                        // The hook may only change values.  Everything else is
                        // taken from the copy made before the hook ran.
                        let mut repaired = std::mem::take(&mut slice);
                        slice = before
                            .into_iter()
                            .map(|(name, mut option)| {
                                if let Some(hooked) = repaired.remove(&name) {
                                    option.value = hooked.value;
                                }
                                (name, option)
                            })
                            .collect();
                        if let Some(bad) = slice.values().find(|o| !o.is_valid()) {
                            return Err(KernelError::SetupContract {
                                module: id.to_string(),
                                option: bad.name.clone(),
                                expected: bad.ty(),
                                found: bad.value.kind(),
                            });
                        }
                    }
                    SetupOutcome::Unsupported => {
                        for name in &mismatched {
                            if let Some(option) = slice.get_mut(name) {
                                warn!(
                                    module = %id,
                                    option = %name,
                                    expected = %option.ty(),
                                    found = %option.value.kind(),
                                    "config value has the wrong type; asking the operator"
                                );
                                let prompt =
                                    format!("[{id}] {name}: {}", option.spec.description);
                                option.value = input.prompt_typed(option.ty(), &prompt)?;
                            }
                        }
                    }
                }
            }

            debug!(module = %id, options = slice.len(), "config resolved");
            store.modules.insert(id.to_string(), slice);
        }

        if let Some(stale) = persisted.keys().find(|m| !store.modules.contains_key(*m)) {
            debug!(module = %stale, "dropping persisted config of a module that is not loaded");
        }
        Ok(store)
    }

    /// The on-disk form of the whole store.
    pub fn snapshot(&self) -> Persisted {
        self.modules
            .iter()
            .map(|(id, slice)| {
                let options = slice
                    .iter()
                    .map(|(name, option)| (name.clone(), PersistedOption::from(option)))
                    .collect();
                (id.clone(), options)
            })
            .collect()
    }

    /// Write the store to its path.  A store without a path saves nowhere.
    pub fn save(&self) -> Result<(), KernelError> {
        match &self.path {
            Some(path) => persistence::save_to(&self.snapshot(), path),
            None => Ok(()),
        }
    }

    /// Set `module.option` to `value`, coercing it to the declared type.
    ///
    /// Returns `false` for unknown options and rejected values; the stored
    /// value is left unchanged in both cases.  On success the store is saved;
    /// a failed save is logged and does not undo the change.
    pub fn set(&mut self, module: &str, option: &str, value: Value) -> bool {
        let Some(setting) = self.modules.get_mut(module).and_then(|m| m.get_mut(option)) else {
            debug!(%module, %option, "set on unknown option");
            return false;
        };
        if !setting.set(value) {
            debug!(%module, %option, expected = %setting.ty(), "rejected config value");
            return false;
        }
        info!(%module, %option, value = %setting.value, "config updated");
        if let Err(e) = self.save() {
            warn!(error = %e, "failed to persist config");
        }
        true
    }

    pub fn module(&self, id: &str) -> Option<&ModuleConfig> {
        self.modules.get(id)
    }

    /// Iterate over `(module id, options)` in id order.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &ModuleConfig)> {
        self.modules.iter().map(|(id, m)| (id.as_str(), m))
    }

    pub fn option(&self, module: &str, option: &str) -> Option<&ResolvedOption> {
        self.modules.get(module)?.get(option)
    }

    pub fn get(&self, module: &str, option: &str) -> Option<&Value> {
        self.option(module, option).map(|o| &o.value)
    }

    pub fn number(&self, module: &str, option: &str) -> Option<f64> {
        self.get(module, option)?.as_number()
    }

    pub fn string(&self, module: &str, option: &str) -> Option<&str> {
        self.get(module, option)?.as_str()
    }

    pub fn table(&self, module: &str, option: &str) -> Option<&Value> {
        self.get(module, option).filter(|v| OptionType::Table.matches(v))
    }
}
