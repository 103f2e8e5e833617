//! [`Registry`] – loads the declared module list in order.
//!
//! Declaration order is the only ordering guarantee the kernel offers: there
//! is no dependency graph and no cycle detection.  A module that fails to
//! load, or that loads without a usable identity, is logged and skipped;
//! bootstrap continues with the rest.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::module::{Module, ModuleInfo, ModuleSource};

/// A module that was declared but not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedModule {
    /// The declared source name.
    pub source: String,
    pub reason: String,
}

/// The set of loaded modules plus their declaration order.
///
/// # Example
///
/// ```
/// use anvil_kernel::{
///     Configurable, Identifiable, Initializable, KernelContext, ModuleInterface,
///     ModuleSource, Registry,
/// };
/// use anvil_types::KernelError;
///
/// struct Grid;
/// impl Identifiable for Grid {
///     fn id(&self) -> &str { "grid" }
///     fn version(&self) -> &str { "1.2.0" }
/// }
/// impl Configurable for Grid {}
/// impl Initializable for Grid {
///     fn init(&self, _: &KernelContext) -> Result<ModuleInterface, KernelError> {
///         Ok(ModuleInterface::new())
///     }
/// }
///
/// let registry = Registry::load_all(vec![
///     ModuleSource::from_module(Grid),
///     ModuleSource::new("network", || Err(KernelError::ModuleLoad {
///         module: "network".into(),
///         reason: "modem not attached".into(),
///     })),
/// ]);
/// assert_eq!(registry.order(), ["grid"]);
/// assert_eq!(registry.skipped()[0].source, "network");
/// ```
#[derive(Default)]
pub struct Registry {
    modules: HashMap<String, Box<dyn Module>>,
    order: Vec<String>,
    skipped: Vec<SkippedModule>,
}

impl Registry {
    /// Load every source in declaration order.
    pub fn load_all(sources: impl IntoIterator<Item = ModuleSource>) -> Self {
        let mut registry = Self::default();
        for source in sources {
            let name = source.name().to_string();
            match source.load() {
                Ok(module) => {
                    if let Err(reason) = registry.admit(module) {
                        warn!(source = %name, %reason, "skipping module");
                        registry.skipped.push(SkippedModule { source: name, reason });
                    }
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "module failed to load; skipping");
                    registry.skipped.push(SkippedModule {
                        source: name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        registry
    }

    fn admit(&mut self, module: Box<dyn Module>) -> Result<(), String> {
        let id = module.id().to_string();
        if id.is_empty() {
            return Err("module has no id".to_string());
        }
        if module.version().is_empty() {
            return Err(format!("module '{id}' has no version"));
        }
        if self.modules.contains_key(&id) {
            return Err(format!("module id '{id}' is already loaded"));
        }
        info!(module = %id, version = %module.version(), "module loaded");
        self.order.push(id.clone());
        self.modules.insert(id, module);
        Ok(())
    }

    /// Module ids in declaration order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, id: &str) -> Option<&dyn Module> {
        self.modules.get(id).map(|m| m.as_ref())
    }

    /// Iterate over loaded modules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Module> {
        self.order
            .iter()
            .filter_map(|id| self.modules.get(id).map(|m| m.as_ref()))
    }

    /// Identity of every loaded module in declaration order.
    pub fn infos(&self) -> Vec<ModuleInfo> {
        self.iter()
            .map(|m| ModuleInfo {
                id: m.id().to_string(),
                version: m.version().to_string(),
            })
            .collect()
    }

    pub fn skipped(&self) -> &[SkippedModule] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::KernelContext;
    use crate::module::{Configurable, Identifiable, Initializable, ModuleInterface};
    use anvil_types::KernelError;

    struct Stub {
        id: &'static str,
        version: &'static str,
    }

    impl Identifiable for Stub {
        fn id(&self) -> &str {
            self.id
        }
        fn version(&self) -> &str {
            self.version
        }
    }

    impl Configurable for Stub {}

    impl Initializable for Stub {
        fn init(&self, _ctx: &KernelContext) -> Result<ModuleInterface, KernelError> {
            Ok(ModuleInterface::new())
        }
    }

    fn stub(id: &'static str) -> ModuleSource {
        ModuleSource::from_module(Stub { id, version: "1.0" })
    }

    #[test]
    fn order_follows_declaration() {
        let registry = Registry::load_all(vec![stub("inventory"), stub("crafting"), stub("grid")]);
        assert_eq!(registry.order(), ["inventory", "crafting", "grid"]);
        let ids: Vec<&str> = registry.iter().map(|m| m.id()).collect();
        assert_eq!(ids, ["inventory", "crafting", "grid"]);
    }

    #[test]
    fn failing_loader_is_skipped() {
        let registry = Registry::load_all(vec![
            stub("inventory"),
            ModuleSource::new("network", || {
                Err(KernelError::ModuleLoad {
                    module: "network".into(),
                    reason: "file not found".into(),
                })
            }),
            stub("ui"),
        ]);
        assert_eq!(registry.order(), ["inventory", "ui"]);
        assert_eq!(registry.skipped().len(), 1);
        assert!(registry.skipped()[0].reason.contains("file not found"));
    }

    #[test]
    fn missing_identity_is_skipped() {
        let registry = Registry::load_all(vec![
            ModuleSource::from_module(Stub { id: "", version: "1.0" }),
            ModuleSource::from_module(Stub { id: "grid", version: "" }),
        ]);
        assert!(registry.is_empty());
        assert_eq!(registry.skipped().len(), 2);
    }

    #[test]
    fn duplicate_id_keeps_first() {
        let registry = Registry::load_all(vec![
            ModuleSource::from_module(Stub { id: "grid", version: "1.0" }),
            ModuleSource::from_module(Stub { id: "grid", version: "2.0" }),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("grid").unwrap().version(), "1.0");
        assert!(registry.skipped()[0].reason.contains("already loaded"));
    }

    #[test]
    fn infos_list_identity_in_order() {
        let registry = Registry::load_all(vec![stub("a"), stub("b")]);
        let infos = registry.infos();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].id, "b");
        assert_eq!(infos[1].version, "1.0");
    }
}
