//! [`Task`] – a module's resumable `start` entry point.
//!
//! A task is resumed with one event at a time and answers with a [`Resume`]:
//! either it suspends, naming the event kind it wants next (or none for any
//! event), or it finishes.  Returning `Err` is a failure, which the scheduler
//! treats as fatal to the whole process.

use anvil_types::{Event, KernelError};
use thiserror::Error;

use crate::context::KernelContext;

/// What a task asks for after one resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// Wait for the next event.  `Some(kind)` wakes only on events of that
    /// kind; `None` wakes on every event.
    Suspended(Option<String>),
    /// The task is done and will never be resumed again.
    Finished,
}

impl Resume {
    /// Suspend until an event of `kind` arrives.
    pub fn wait_for(kind: impl Into<String>) -> Self {
        Resume::Suspended(Some(kind.into()))
    }

    /// Suspend until any event arrives.
    pub fn any() -> Self {
        Resume::Suspended(None)
    }
}

/// An unrecovered task error, with the frames collected on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    /// Innermost frame first.
    pub trace: Vec<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// Append a context frame.
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.trace.push(frame.into());
        self
    }
}

impl From<KernelError> for TaskError {
    fn from(e: KernelError) -> Self {
        TaskError::new(e.to_string())
    }
}

pub trait Task {
    fn resume(&mut self, ctx: &mut KernelContext, event: &Event) -> Result<Resume, TaskError>;
}

impl<F> Task for F
where
    F: FnMut(&mut KernelContext, &Event) -> Result<Resume, TaskError>,
{
    fn resume(&mut self, ctx: &mut KernelContext, event: &Event) -> Result<Resume, TaskError> {
        self(ctx, event)
    }
}

/// Scheduler-side view of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Registered, never resumed.
    Idle,
    /// Suspended with the given filter; `None` means any event.
    Waiting(Option<String>),
    /// Returned [`Resume::Finished`].
    Finished,
    /// Failed; terminal.
    Failed,
}

impl TaskState {
    /// `true` when a task in this state should be resumed with `event`.
    pub fn wants(&self, event: &Event) -> bool {
        match self {
            TaskState::Idle | TaskState::Waiting(None) => true,
            TaskState::Waiting(Some(filter)) => filter.is_empty() || *filter == event.kind,
            TaskState::Finished | TaskState::Failed => false,
        }
    }

    pub fn filter(&self) -> Option<&str> {
        match self {
            TaskState::Waiting(Some(f)) if !f.is_empty() => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_task_ignores_other_kinds() {
        let state = TaskState::Waiting(Some("redstone".into()));
        assert!(!state.wants(&Event::new("timer")));
        assert!(state.wants(&Event::new("redstone")));
    }

    #[test]
    fn unfiltered_and_idle_tasks_want_everything() {
        for state in [
            TaskState::Idle,
            TaskState::Waiting(None),
            TaskState::Waiting(Some(String::new())),
        ] {
            assert!(state.wants(&Event::new("timer")));
            assert!(state.wants(&Event::new("modem_message")));
            assert_eq!(state.filter(), None);
        }
    }

    #[test]
    fn terminal_states_want_nothing() {
        assert!(!TaskState::Finished.wants(&Event::new("timer")));
        assert!(!TaskState::Failed.wants(&Event::new("timer")));
    }

    #[test]
    fn frames_accumulate_in_order() {
        let err = TaskError::new("slot 3 is empty")
            .with_frame("craft step 2")
            .with_frame("recipe planner");
        assert_eq!(err.to_string(), "slot 3 is empty");
        assert_eq!(err.trace, ["craft step 2", "recipe planner"]);
    }
}
