//! The module contract, split into capability traits.
//!
//! The registry and the scheduler only ever talk to these traits, so module
//! bodies (inventory, crafting, grid, network, UI) can be developed without
//! touching kernel code.
//!
//! | Trait | Provides |
//! |---|---|
//! | [`Identifiable`] | unique `id` and display `version` |
//! | [`Configurable`] | option specs and the optional first-run `setup` hook |
//! | [`Initializable`] | `init`, which returns the module's [`ModuleInterface`] |
//! | [`Startable`] | the resumable `start` task, if the interface has one |

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use anvil_types::KernelError;

use crate::config_store::{ConfigSpec, ModuleConfig};
use crate::context::KernelContext;
use crate::task::Task;

// ────────────────────────────────────────────────────────────────────────────
// Capability traits
// ────────────────────────────────────────────────────────────────────────────

pub trait Identifiable {
    /// Unique key, e.g. `"inventory"`.
    fn id(&self) -> &str;

    /// Display-only version string.
    fn version(&self) -> &str;
}

/// Result of offering a module its first-run repair hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// The module has no repair hook; the operator is prompted instead.
    Unsupported,
    /// The hook ran and claims every option now has its declared type.
    Ran,
}

pub trait Configurable {
    /// Declared options keyed by name.  Defaults to none.
    fn config_spec(&self) -> ConfigSpec {
        ConfigSpec::new()
    }

    /// First-run repair hook.
    ///
    /// Called at most once per resolution pass, only when at least one option
    /// of this module holds a value of the wrong type.  A module returning
    /// [`SetupOutcome::Ran`] must leave every option correctly typed; the
    /// config store aborts bootstrap otherwise.
    fn setup(&self, _config: &mut ModuleConfig) -> SetupOutcome {
        SetupOutcome::Unsupported
    }
}

pub trait Initializable {
    /// Build the module's interface.
    ///
    /// `ctx` exposes the resolved configuration and the exports of every
    /// module initialized earlier in registration order.
    fn init(&self, ctx: &KernelContext) -> Result<ModuleInterface, KernelError>;
}

pub trait Startable {
    /// Hand over the `start` task.  Returns `None` after the first call.
    fn take_start(&mut self) -> Option<Box<dyn Task>>;
}

/// Everything the kernel needs from a module.
pub trait Module: Identifiable + Configurable + Initializable {}

impl<T: Identifiable + Configurable + Initializable + ?Sized> Module for T {}

// ────────────────────────────────────────────────────────────────────────────
// ModuleInterface
// ────────────────────────────────────────────────────────────────────────────

/// The handle a module's `init` returns.
///
/// `exports` is published to later modules under the module id; `start`, when
/// present, is registered with the scheduler.
#[derive(Default)]
pub struct ModuleInterface {
    exports: Option<Rc<dyn Any>>,
    start: Option<Box<dyn Task>>,
}

impl ModuleInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `exports` for other modules to read via
    /// [`KernelContext::interface`].
    pub fn with_exports<T: Any>(mut self, exports: Rc<T>) -> Self {
        self.exports = Some(exports as Rc<dyn Any>);
        self
    }

    pub fn with_start(mut self, task: impl Task + 'static) -> Self {
        self.start = Some(Box::new(task) as Box<dyn Task>);
        self
    }

    pub fn exports(&self) -> Option<Rc<dyn Any>> {
        self.exports.clone()
    }

    pub fn has_start(&self) -> bool {
        self.start.is_some()
    }
}

impl Startable for ModuleInterface {
    fn take_start(&mut self) -> Option<Box<dyn Task>> {
        self.start.take()
    }
}

impl fmt::Debug for ModuleInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInterface")
            .field("exports", &self.exports.is_some())
            .field("start", &self.start.is_some())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Module sources
// ────────────────────────────────────────────────────────────────────────────

/// Identity of a loaded module, as listed in crash reports and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: String,
    pub version: String,
}

type Loader = Box<dyn FnOnce() -> Result<Box<dyn Module>, KernelError>>;

/// One entry of the declared module list: a name for diagnostics and a
/// fallible constructor.
pub struct ModuleSource {
    name: String,
    loader: Loader,
}

impl ModuleSource {
    pub fn new(
        name: impl Into<String>,
        loader: impl FnOnce() -> Result<Box<dyn Module>, KernelError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            loader: Box::new(loader),
        }
    }

    /// Wrap an already constructed module.
    pub fn from_module(module: impl Module + 'static) -> Self {
        let name = module.id().to_string();
        Self::new(name, move || Ok(Box::new(module) as Box<dyn Module>))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn load(self) -> Result<Box<dyn Module>, KernelError> {
        (self.loader)()
    }
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSource").field("name", &self.name).finish()
    }
}
