//! `heartbeat` – proves the scheduler is alive.
//!
//! Counts `timer` events and logs a beat every `every` ticks.  The beat
//! counter is exported as [`Pulse`] so other modules can read it.

use std::cell::Cell;
use std::rc::Rc;

use anvil_kernel::{
    ConfigSpec, Configurable, Identifiable, Initializable, KernelContext, ModuleConfig,
    ModuleInterface, OptionSpec, Resume, SetupOutcome, TIMER_EVENT, Task, TaskError,
};
use anvil_types::{Event, KernelError, OptionType};
use tracing::{info, warn};

pub const ID: &str = "heartbeat";

const DEFAULT_EVERY: i64 = 20;

/// Exported beat counter.
#[derive(Debug, Default)]
pub struct Pulse {
    ticks: Cell<u64>,
    beats: Cell<u64>,
}

impl Pulse {
    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    pub fn beats(&self) -> u64 {
        self.beats.get()
    }
}

pub struct Heartbeat;

impl Identifiable for Heartbeat {
    fn id(&self) -> &str {
        ID
    }

    fn version(&self) -> &str {
        "0.1.0"
    }
}

impl Configurable for Heartbeat {
    fn config_spec(&self) -> ConfigSpec {
        ConfigSpec::from([
            (
                "label".to_string(),
                OptionSpec::new(OptionType::String, "heartbeat", "Name printed with every beat"),
            ),
            (
                "every".to_string(),
                OptionSpec::new(OptionType::Number, DEFAULT_EVERY, "Timer ticks per beat"),
            ),
        ])
    }

    /// Coerce what can be coerced; fall back to the default otherwise.
    fn setup(&self, config: &mut ModuleConfig) -> SetupOutcome {
        for option in config.values_mut().filter(|o| !o.is_valid()) {
            let found = option.value.clone();
            if !option.set(found) {
                warn!(option = %option.name, value = %option.value, "unusable value; using default");
                option.value = option.spec.default.clone();
            }
        }
        SetupOutcome::Ran
    }
}

impl Initializable for Heartbeat {
    fn init(&self, _ctx: &KernelContext) -> Result<ModuleInterface, KernelError> {
        let pulse = Rc::new(Pulse::default());
        Ok(ModuleInterface::new()
            .with_exports(pulse.clone())
            .with_start(HeartbeatTask { pulse }))
    }
}

struct HeartbeatTask {
    pulse: Rc<Pulse>,
}

impl Task for HeartbeatTask {
    fn resume(&mut self, ctx: &mut KernelContext, event: &Event) -> Result<Resume, TaskError> {
        if event.kind == TIMER_EVENT {
            let ticks = self.pulse.ticks.get() + 1;
            self.pulse.ticks.set(ticks);

            // Re-read every tick so `/set heartbeat every` applies at once.
            let every = ctx
                .config()
                .number(ID, "every")
                .filter(|n| *n >= 1.0)
                .map_or(DEFAULT_EVERY as u64, |n| n as u64);
            if ticks % every == 0 {
                let beats = self.pulse.beats.get() + 1;
                self.pulse.beats.set(beats);
                let label = ctx.config().string(ID, "label").unwrap_or(ID);
                info!(%label, beats, ticks, "beat");
            }
        }
        Ok(Resume::wait_for(TIMER_EVENT))
    }
}
