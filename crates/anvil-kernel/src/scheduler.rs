//! [`Scheduler`] – cooperative, single-threaded event dispatch.
//!
//! # Cycle
//!
//! Each cycle pulls exactly one event from the [`EventHost`], bracketed by a
//! zero-duration watchdog timer that is cancelled right after the pull.  The
//! reserved `terminate` event stops the loop.  Any other event is offered to
//! every task in registration order; a task is resumed only when its current
//! filter is empty or equals the event kind.
//!
//! # Failure policy
//!
//! The first task failure ends the run: no further task is resumed, and the
//! caller receives the [`TaskFailure`] to build a crash report from.  A panic
//! inside a resume is caught and treated the same way as an `Err`; its source
//! location, and a backtrace when `RUST_BACKTRACE` enables one, become the
//! innermost trace frames.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::time::Duration;

use anvil_types::{Event, KernelError};
use tracing::{debug, error, info, trace};

use crate::context::KernelContext;
use crate::host::EventHost;
use crate::task::{Resume, Task, TaskError, TaskState};

/// An unrecovered task failure.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub module_id: String,
    pub error: TaskError,
    /// Cycle number (1-based) in which the task failed.
    pub cycle: u64,
    pub event_kind: String,
}

/// Why [`Scheduler::run`] returned.
#[derive(Debug)]
pub enum Exit {
    /// A `terminate` event was pulled.
    Terminated,
    /// A task failed.
    Crashed(TaskFailure),
}

struct Slot {
    module_id: String,
    task: Box<dyn Task>,
    state: TaskState,
    resumes: u64,
}

/// The ordered list of tasks and the run loop that drives them.
#[derive(Default)]
pub struct Scheduler {
    slots: Vec<Slot>,
    cycle: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task.  Dispatch order is registration order.
    pub fn register(&mut self, module_id: impl Into<String>, task: Box<dyn Task>) {
        let module_id = module_id.into();
        debug!(module = %module_id, "task registered");
        self.slots.push(Slot {
            module_id,
            task,
            state: TaskState::Idle,
            resumes: 0,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Module ids of the registered tasks, in dispatch order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.module_id.as_str())
    }

    pub fn state(&self, module_id: &str) -> Option<&TaskState> {
        self.slot(module_id).map(|s| &s.state)
    }

    /// How many times the task of `module_id` has been resumed.
    pub fn resumes(&self, module_id: &str) -> Option<u64> {
        self.slot(module_id).map(|s| s.resumes)
    }

    /// Cycles completed or in progress.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn slot(&self, module_id: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.module_id == module_id)
    }

    /// Pull one event, guarded by a zero-duration watchdog timer.
    pub fn next_event<H: EventHost + ?Sized>(host: &mut H) -> Result<Event, KernelError> {
        let watchdog = host.start_timer(Duration::ZERO);
        let event = host.pull_raw();
        host.cancel_timer(watchdog);
        event
    }

    /// Offer `event` to every task, in registration order.
    ///
    /// Stops at the first failure and returns it; tasks after the failing one
    /// are not resumed in this cycle.
    pub fn dispatch(&mut self, ctx: &mut KernelContext, event: &Event) -> Result<(), TaskFailure> {
        self.cycle += 1;
        let cycle = self.cycle;

        for slot in &mut self.slots {
            if !slot.state.wants(event) {
                continue;
            }
            slot.resumes += 1;
            trace!(module = %slot.module_id, event = %event.kind, cycle, "resuming task");

            let task = &mut slot.task;
            let outcome = guarded_resume(|| task.resume(ctx, event));

            match outcome {
                Ok(Resume::Suspended(filter)) => {
                    slot.state = TaskState::Waiting(filter.filter(|f| !f.is_empty()));
                }
                Ok(Resume::Finished) => {
                    info!(module = %slot.module_id, "task finished");
                    slot.state = TaskState::Finished;
                }
                Err(err) => {
                    slot.state = TaskState::Failed;
                    error!(module = %slot.module_id, event = %event.kind, cycle, error = %err, "task failed");
                    let error = err.with_frame(format!(
                        "resume #{} of '{}' on '{}' event (cycle {cycle})",
                        slot.resumes, slot.module_id, event.kind
                    ));
                    return Err(TaskFailure {
                        module_id: slot.module_id.clone(),
                        error,
                        cycle,
                        event_kind: event.kind.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run until `terminate` or the first task failure.
    ///
    /// Events queued by tasks through [`KernelContext::queue_event`] are
    /// forwarded to the host after every cycle.
    ///
    /// # Errors
    ///
    /// Only host failures are errors; task failures come back as
    /// [`Exit::Crashed`].
    pub fn run<H: EventHost + ?Sized>(
        &mut self,
        host: &mut H,
        ctx: &mut KernelContext,
    ) -> Result<Exit, KernelError> {
        info!(tasks = self.slots.len(), "scheduler running");
        loop {
            let event = Self::next_event(host)?;
            if event.is_terminate() {
                info!(cycles = self.cycle, "terminate received; scheduler stopping");
                return Ok(Exit::Terminated);
            }
            let dispatched = self.dispatch(ctx, &event);
            for queued in ctx.drain_outbox() {
                host.queue_event(queued);
            }
            if let Err(failure) = dispatched {
                return Ok(Exit::Crashed(failure));
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Panic capture
// ────────────────────────────────────────────────────────────────────────────

/// Where a task panicked, recorded by the panic hook.
struct PanicSite {
    location: Option<String>,
    backtrace: Backtrace,
}

thread_local! {
    static IN_RESUME: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook in front of the existing one.  Panics raised inside a task
/// resume are recorded for the crash report; all others go to the previous
/// hook unchanged.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !IN_RESUME.with(Cell::get) {
                previous(info);
                return;
            }
            let site = PanicSite {
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                backtrace: Backtrace::capture(),
            };
            LAST_PANIC.with(|last| *last.borrow_mut() = Some(site));
        }));
    });
}

/// Run one resume, turning a panic into a [`TaskError`] whose trace starts at
/// the panic site.
fn guarded_resume(
    resume: impl FnOnce() -> Result<Resume, TaskError>,
) -> Result<Resume, TaskError> {
    install_panic_hook();
    LAST_PANIC.with(|last| last.borrow_mut().take());
    IN_RESUME.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(resume));
    IN_RESUME.with(|flag| flag.set(false));

    let payload = match outcome {
        Ok(result) => return result,
        Err(payload) => payload,
    };
    let mut error = TaskError::new(panic_message(payload.as_ref()));
    if let Some(site) = LAST_PANIC.with(|last| last.borrow_mut().take()) {
        if let Some(location) = site.location {
            error = error.with_frame(format!("panicked at {location}"));
        }
        if site.backtrace.status() == BacktraceStatus::Captured {
            for line in site.backtrace.to_string().lines() {
                let line = line.trim();
                if !line.is_empty() {
                    error = error.with_frame(line);
                }
            }
        }
    }
    Err(error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked: <unknown payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn ctx() -> KernelContext {
        KernelContext::new(ConfigStore::new(), Vec::new())
    }

    /// Records `"<id>:<event kind>"` and then waits for `filter`.
    fn recorder(id: &'static str, log: &Log, filter: Option<&'static str>) -> Box<dyn Task> {
        let log = log.clone();
        Box::new(move |_: &mut KernelContext, event: &Event| -> Result<Resume, TaskError> {
            log.borrow_mut().push(format!("{id}:{}", event.kind));
            Ok(Resume::Suspended(filter.map(str::to_string)))
        })
    }

    #[test]
    fn unfiltered_tasks_resume_in_registration_order() {
        let log = Log::default();
        let mut sched = Scheduler::new();
        sched.register("A", recorder("A", &log, None));
        sched.register("B", recorder("B", &log, None));

        sched.dispatch(&mut ctx(), &Event::new("tick")).unwrap();
        assert_eq!(*log.borrow(), ["A:tick", "B:tick"]);
    }

    #[test]
    fn filtered_task_skips_other_kinds() {
        let log = Log::default();
        let mut sched = Scheduler::new();
        sched.register("door", recorder("door", &log, Some("redstone")));
        sched.register("clock", recorder("clock", &log, None));
        let mut ctx = ctx();

        // First resume is unconditional; afterwards the filter applies.
        sched.dispatch(&mut ctx, &Event::new("boot")).unwrap();
        sched.dispatch(&mut ctx, &Event::new("timer")).unwrap();
        sched.dispatch(&mut ctx, &Event::new("redstone")).unwrap();

        assert_eq!(
            *log.borrow(),
            ["door:boot", "clock:boot", "clock:timer", "door:redstone", "clock:redstone"]
        );
        assert_eq!(sched.resumes("door"), Some(2));
        assert_eq!(sched.state("door"), Some(&TaskState::Waiting(Some("redstone".into()))));
    }

    #[test]
    fn finished_task_is_not_resumed_again() {
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let mut sched = Scheduler::new();
        sched.register(
            "once",
            Box::new(move |_: &mut KernelContext, _: &Event| -> Result<Resume, TaskError> {
                *c.borrow_mut() += 1;
                Ok(Resume::Finished)
            }),
        );
        let mut ctx = ctx();
        sched.dispatch(&mut ctx, &Event::new("a")).unwrap();
        sched.dispatch(&mut ctx, &Event::new("b")).unwrap();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(sched.state("once"), Some(&TaskState::Finished));
    }

    #[test]
    fn failure_stops_the_cycle() {
        let log = Log::default();
        let mut sched = Scheduler::new();
        sched.register(
            "bad",
            Box::new(|_: &mut KernelContext, _: &Event| -> Result<Resume, TaskError> {
                Err(TaskError::new("modem detached"))
            }),
        );
        sched.register("after", recorder("after", &log, None));

        let failure = sched.dispatch(&mut ctx(), &Event::new("tick")).unwrap_err();
        assert_eq!(failure.module_id, "bad");
        assert_eq!(failure.cycle, 1);
        assert_eq!(failure.error.message, "modem detached");
        assert!(failure.error.trace[0].contains("'bad'"));
        assert!(log.borrow().is_empty());
        assert_eq!(sched.state("bad"), Some(&TaskState::Failed));
    }

    #[test]
    fn panic_is_caught_as_failure() {
        let mut sched = Scheduler::new();
        sched.register(
            "grid",
            Box::new(|_: &mut KernelContext, _: &Event| -> Result<Resume, TaskError> {
                panic!("index out of bounds")
            }),
        );
        let failure = sched.dispatch(&mut ctx(), &Event::new("tick")).unwrap_err();
        assert_eq!(failure.module_id, "grid");
        assert!(failure.error.message.contains("index out of bounds"));
    }

    #[test]
    fn panic_location_leads_the_trace() {
        let mut sched = Scheduler::new();
        sched.register(
            "B",
            Box::new(|_: &mut KernelContext, _: &Event| -> Result<Resume, TaskError> {
                let slots: Vec<u32> = Vec::new();
                Ok(Resume::wait_for(slots[3].to_string()))
            }),
        );
        let failure = sched.dispatch(&mut ctx(), &Event::new("tick")).unwrap_err();
        let trace = &failure.error.trace;
        assert!(trace[0].starts_with(&format!("panicked at {}:", file!())), "{trace:?}");
        assert_eq!(trace.last().unwrap(), "resume #1 of 'B' on 'tick' event (cycle 1)");
    }

    #[test]
    fn panic_site_does_not_leak_into_later_errors() {
        let mut sched = Scheduler::new();
        sched.register(
            "grid",
            Box::new(|_: &mut KernelContext, _: &Event| -> Result<Resume, TaskError> {
                Err(TaskError::new("plain error"))
            }),
        );
        let failure = sched.dispatch(&mut ctx(), &Event::new("tick")).unwrap_err();
        assert_eq!(failure.error.trace.len(), 1);
    }

    #[test]
    fn empty_filter_is_normalised_to_any() {
        let log = Log::default();
        let mut sched = Scheduler::new();
        sched.register("ui", recorder("ui", &log, Some("")));
        let mut ctx = ctx();
        sched.dispatch(&mut ctx, &Event::new("a")).unwrap();
        sched.dispatch(&mut ctx, &Event::new("b")).unwrap();
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(sched.state("ui"), Some(&TaskState::Waiting(None)));
    }
}
