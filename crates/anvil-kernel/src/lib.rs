//! `anvil-kernel` – module orchestration for a single-threaded device.
//!
//! The kernel does not implement any subsystem itself; it lets independent
//! modules share one execution context.
//!
//! # Modules
//!
//! - [`module`] – the capability traits a module implements
//!   ([`Identifiable`], [`Configurable`], [`Initializable`], [`Startable`]).
//! - [`registry`] – [`Registry`]: loads the declared module list in order,
//!   skipping modules that fail to load.
//! - [`config_store`] – [`ConfigStore`]: resolves every declared option to a
//!   value of its declared type, repairing mismatches through the module's
//!   `setup` hook or an [`InputPort`], and persists the result.
//! - [`scheduler`] – [`Scheduler`]: resumes each module's [`Task`] on the
//!   events it waits for, in registration order.
//! - [`host`] – [`EventHost`] and the channel-backed [`ChannelHost`].
//! - [`crash`] – [`CrashReport`] and [`CrashReporter`].
//! - [`kernel`] – [`Kernel`]: the bootstrap sequence tying it all together.
//!
//! # Failure policy
//!
//! Any task failure is fatal.  [`Kernel::run`] returns
//! [`Exit::Crashed`] and the embedding binary is expected to write the crash
//! report and exit.

pub mod config_store;
pub mod context;
pub mod crash;
pub mod host;
pub mod input;
pub mod kernel;
pub mod module;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod timers;

pub use config_store::{ConfigSpec, ConfigStore, ModuleConfig, OptionSpec, ResolvedOption};
pub use context::KernelContext;
pub use crash::{CrashEntry, CrashReport, CrashReporter};
pub use host::{ChannelHost, EventHost, HostSender, TIMER_EVENT};
pub use input::{InputPort, LinePrompt};
pub use kernel::Kernel;
pub use module::{
    Configurable, Identifiable, Initializable, Module, ModuleInfo, ModuleInterface, ModuleSource,
    SetupOutcome, Startable,
};
pub use registry::{Registry, SkippedModule};
pub use scheduler::{Exit, Scheduler, TaskFailure};
pub use task::{Resume, Task, TaskError, TaskState};
pub use timers::TimerId;
