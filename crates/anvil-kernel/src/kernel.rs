//! [`Kernel`] – bootstrap sequencing.
//!
//! 1. Load every declared module ([`Registry::load_all`]).
//! 2. Read persisted config, resolve and repair it, then save it.
//! 3. Initialize modules in registration order, publishing their exports.
//! 4. Register every returned `start` task with the [`Scheduler`].
//!
//! [`Kernel::run`] then drives the scheduler until `terminate` or a crash.

use std::path::PathBuf;

use anvil_types::KernelError;
use tracing::{info, warn};

use crate::config_store::ConfigStore;
use crate::context::KernelContext;
use crate::crash::CrashReport;
use crate::host::EventHost;
use crate::input::InputPort;
use crate::module::{ModuleSource, Startable};
use crate::persistence::{self, Persisted};
use crate::registry::Registry;
use crate::scheduler::{Exit, Scheduler, TaskFailure};

pub struct Kernel {
    registry: Registry,
    context: KernelContext,
    scheduler: Scheduler,
}

impl Kernel {
    /// Bring the kernel up.
    ///
    /// `config_path` is where module settings persist; `None` keeps them in
    /// memory only.  `input` answers repair prompts for mistyped options.
    ///
    /// # Errors
    ///
    /// A setup hook that breaks its contract, an input port failure during
    /// repair, or a module whose `init` fails.  Modules that fail to load are
    /// skipped, not errors.
    pub fn boot(
        sources: impl IntoIterator<Item = ModuleSource>,
        config_path: Option<PathBuf>,
        input: &mut dyn InputPort,
    ) -> Result<Self, KernelError> {
        let registry = Registry::load_all(sources);
        info!(
            loaded = registry.len(),
            skipped = registry.skipped().len(),
            "module registry ready"
        );

        let persisted = match &config_path {
            Some(path) => persistence::load_from(path).unwrap_or_else(|e| {
                warn!(error = %e, "persisted config unreadable; starting from defaults");
                Persisted::new()
            }),
            None => Persisted::new(),
        };

        let mut config = ConfigStore::resolve(&registry, &persisted, input)?;
        if let Some(path) = config_path {
            config = config.with_path(path);
        }
        if let Err(e) = config.save() {
            warn!(error = %e, "failed to persist resolved config");
        }

        let mut context = KernelContext::new(config, registry.infos());
        let mut scheduler = Scheduler::new();

        for module in registry.iter() {
            let id = module.id();
            let mut interface = module.init(&context).map_err(|e| match e {
                KernelError::ModuleInit { .. } => e,
                other => KernelError::ModuleInit {
                    module: id.to_string(),
                    reason: other.to_string(),
                },
            })?;
            if let Some(exports) = interface.exports() {
                context.publish(id, exports);
            }
            let task = interface.take_start();
            info!(module = %id, version = %module.version(), task = task.is_some(), "module initialised");
            if let Some(task) = task {
                scheduler.register(id, task);
            }
        }

        Ok(Self {
            registry,
            context,
            scheduler,
        })
    }

    /// Drive the scheduler until `terminate` or the first task failure.
    pub fn run<H: EventHost + ?Sized>(&mut self, host: &mut H) -> Result<Exit, KernelError> {
        self.scheduler.run(host, &mut self.context)
    }

    /// Build the crash report for `failure` over every loaded module.
    pub fn crash_report(&self, failure: &TaskFailure) -> CrashReport {
        CrashReport::new(self.context.modules(), failure)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn context(&self) -> &KernelContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut KernelContext {
        &mut self.context
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
