//! [`EventHost`] – the host's raw event primitives, and [`ChannelHost`].
//!
//! The scheduler pulls exactly one event per cycle from a host.  Hosts also
//! provide timers (the scheduler arms a zero-duration one around every pull)
//! and an event queue that tasks can post to.
//!
//! [`ChannelHost`] is an in-process host fed through a cloneable
//! [`HostSender`], so signal handlers and reader threads can inject events.
//! Timers fire as `timer` events carrying the timer id, never sooner than one
//! host tick after arming.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use anvil_types::{Event, KernelError};
use tracing::trace;

use crate::timers::{TimerId, TimerTable};

/// Event kind delivered when a host timer fires.
pub const TIMER_EVENT: &str = "timer";

/// Default host tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

pub trait EventHost {
    /// Arm a timer that delivers a [`TIMER_EVENT`] after `after`.
    fn start_timer(&mut self, after: Duration) -> TimerId;

    /// Disarm a timer.  No-op if it already fired.
    fn cancel_timer(&mut self, id: TimerId);

    /// Block until the next event is available.
    fn pull_raw(&mut self) -> Result<Event, KernelError>;

    /// Append `event` to the host queue.
    fn queue_event(&mut self, event: Event);
}

/// Cloneable, thread-safe handle for injecting events into a [`ChannelHost`].
#[derive(Clone, Debug)]
pub struct HostSender(Sender<Event>);

impl HostSender {
    /// Returns `false` once the host has been dropped.
    pub fn send(&self, event: Event) -> bool {
        self.0.send(event).is_ok()
    }
}

/// A host whose events arrive over an mpsc channel.
///
/// Delivery order: events queued locally with [`EventHost::queue_event`],
/// then events sent through a [`HostSender`], then expired timers.
pub struct ChannelHost {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    local: VecDeque<Event>,
    timers: TimerTable,
    tick: Duration,
}

impl Default for ChannelHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHost {
    pub fn new() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }

    pub fn with_tick(tick: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            local: VecDeque::new(),
            timers: TimerTable::new(),
            tick,
        }
    }

    pub fn sender(&self) -> HostSender {
        HostSender(self.tx.clone())
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    fn timer_event(id: TimerId) -> Event {
        Event::new(TIMER_EVENT).with(id.0 as i64)
    }
}

impl EventHost for ChannelHost {
    fn start_timer(&mut self, after: Duration) -> TimerId {
        self.timers.arm(after.max(self.tick))
    }

    fn cancel_timer(&mut self, id: TimerId) {
        self.timers.cancel(id);
    }

    fn pull_raw(&mut self) -> Result<Event, KernelError> {
        loop {
            if let Some(event) = self.local.pop_front() {
                return Ok(event);
            }
            match self.rx.try_recv() {
                Ok(event) => return Ok(event),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return Err(KernelError::Host("event channel closed".to_string()));
                }
            }
            if let Some(id) = self.timers.take_expired(Instant::now()) {
                trace!(timer = id.0, "timer fired");
                return Ok(Self::timer_event(id));
            }
            match self.timers.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(wait) {
                        Ok(event) => return Ok(event),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(KernelError::Host("event channel closed".to_string()));
                        }
                    }
                }
                None => {
                    return self
                        .rx
                        .recv()
                        .map_err(|_| KernelError::Host("event channel closed".to_string()));
                }
            }
        }
    }

    fn queue_event(&mut self, event: Event) {
        self.local.push_back(event);
    }
}
