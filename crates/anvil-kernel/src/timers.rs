//! [`TimerTable`] – armed host timers and their deadlines.
//!
//! Hosts arm a timer with [`TimerTable::arm`] and poll
//! [`TimerTable::take_expired`] from their event pull; a timer that fires is
//! removed from the table.  Cancelling a timer that already fired is a
//! no-op.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Stand-in deadline for delays too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Handle for an armed timer, unique per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Tracks armed timers by deadline.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use anvil_kernel::timers::TimerTable;
///
/// let mut timers = TimerTable::new();
/// let id = timers.arm(Duration::from_secs(60));
/// assert!(timers.is_armed(id));
/// assert_eq!(timers.take_expired(Instant::now()), None);
///
/// timers.cancel(id);
/// assert!(!timers.is_armed(id));
/// ```
#[derive(Debug, Default)]
pub struct TimerTable {
    next_id: u64,
    deadlines: BTreeMap<TimerId, Instant>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that expires `delay` from now.  Delays past what
    /// [`Instant`] can hold are clamped to a deadline a century away.
    pub fn arm(&mut self, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Disarm `id`.  Returns `false` if it was not armed (already fired,
    /// already cancelled, or never issued).
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.deadlines.remove(&id).is_some()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Remove and return the earliest timer whose deadline is at or before
    /// `now`.
    pub fn take_expired(&mut self, now: Instant) -> Option<TimerId> {
        let (&id, _) = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .min_by_key(|(_, deadline)| **deadline)?;
        self.deadlines.remove(&id);
        Some(id)
    }

    /// The earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
