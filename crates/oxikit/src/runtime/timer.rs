//! Object-owned timers.
//!
//! # Architecture
//!
//! A timer belongs to an [`Object`]: its id sits in the owner's timer list,
//! and the wheel keeps a weak reference back to the owner. The wheel itself
//! holds every armed timer in a map and indexes pending expiries in an
//! ordered set keyed by `(expiry, arm sequence)`, which gives the FIFO
//! tie-break for timers due on the same tick.
//!
//! There is no internal clock or thread. An event loop calls
//! [`TimerWheel::process_expired`] with the current tick count. Ticks are
//! `u32` and may wrap; the wheel widens them to a `u64` clock by adding the
//! wrapping difference between successive calls, so ordering survives
//! wraparound.
//!
//! # Thread Safety
//!
//! All wheel state sits behind one mutex. Callbacks run with that mutex
//! released, so a callback may arm, cancel or reschedule timers (its own
//! included). An object's lock is only ever taken before the wheel's,
//! never while holding it.
//!
//! # Example
//!
//! ```rust
//! use oxikit::{Runtime, TimerAction, TimerOptions};
//!
//! let rt = Runtime::new();
//! let obj = rt.new_object("Object", "blinker").unwrap();
//! rt.root().attach(&obj).unwrap();
//!
//! let timer = rt
//!     .timers()
//!     .arm_with(&obj, TimerOptions::new(10).name("blink"), |_event| TimerAction::Repeat)
//!     .unwrap();
//! assert_eq!(rt.process_expired(10), 1);
//! assert_eq!(rt.process_expired(20), 1);
//! assert!(rt.timers().cancel(timer));
//! assert_eq!(rt.process_expired(30), 0);
//! ```

use crate::error::{Error, Result};
use crate::runtime::object::{Object, ObjectId, ObjectInner};
use crate::sync::lock;
use fxhash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tracing::trace;

/// Identifier of an armed timer. Doubles as its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Handle returned by [`TimerWheel::arm`].
pub type TimerHandle = TimerId;

/// What a callback wants done with its timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Remove the timer.
    Stop,
    /// Fire again after the same interval.
    Repeat,
    /// Fire again after `n` ticks. `Reschedule(0)` stops.
    Reschedule(u32),
}

/// Passed to a timer callback when it fires.
#[derive(Debug, Clone)]
pub struct TimerEvent {
    /// The firing timer.
    pub id: TimerId,
    /// The timer's name.
    pub name: String,
    /// The owner, if it is still alive.
    pub owner: Option<Object>,
    /// Current tick.
    pub tick: u32,
    /// Tick the timer was due at.
    pub scheduled_at: u32,
}

/// Arming options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerOptions {
    /// Name used by [`TimerWheel::find`]. Need not be unique.
    pub name: String,
    /// Ticks until the first expiry.
    pub interval: u32,
    /// Keep the timer armed when its owner is detached or destroyed.
    pub survive_detach: bool,
    /// Remove the timer after its first firing, whatever the callback
    /// returns.
    pub auto_free: bool,
}

impl TimerOptions {
    /// Creates options for an unnamed timer.
    #[must_use]
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keeps the timer armed across owner detach.
    #[must_use]
    pub fn survive_detach(mut self) -> Self {
        self.survive_detach = true;
        self
    }

    /// Frees the timer after it fires once.
    #[must_use]
    pub fn auto_free(mut self) -> Self {
        self.auto_free = true;
        self
    }
}

type TimerCallback = Box<dyn FnMut(&TimerEvent) -> TimerAction + Send>;

struct TimerEntry {
    name: String,
    owner: Weak<ObjectInner>,
    owner_id: ObjectId,
    interval: u32,
    key: (u64, u64),
    survive_detach: bool,
    auto_free: bool,
    running: bool,
    // Set by `reschedule` while the callback runs; wins over its action.
    restart: Option<u32>,
    callback: Option<TimerCallback>,
}

#[derive(Default)]
struct WheelState {
    entries: FxHashMap<TimerId, TimerEntry>,
    pending: BTreeMap<(u64, u64), TimerId>,
    clock: u64,
    next_id: u64,
    next_seq: u64,
}

impl WheelState {
    fn now(&self) -> u32 {
        // The clock starts at tick 0 and advances by tick differences, so
        // its low 32 bits are always the current tick.
        self.clock as u32
    }

    fn advance(&mut self, now: u32) {
        let delta = now.wrapping_sub(self.now());
        // A difference past half the range is a tick that went backwards.
        if delta <= u32::MAX / 2 {
            self.clock += u64::from(delta);
        }
    }

    fn schedule(&mut self, id: TimerId, interval: u32) -> (u64, u64) {
        let key = (self.clock + u64::from(interval), self.next_seq);
        self.next_seq += 1;
        self.pending.insert(key, id);
        key
    }

    fn remove(&mut self, id: TimerId) -> Option<TimerEntry> {
        let entry = self.entries.remove(&id)?;
        if !entry.running {
            self.pending.remove(&entry.key);
        }
        Some(entry)
    }
}

/// The timer subsystem of a runtime.
#[derive(Default)]
pub struct TimerWheel {
    state: Mutex<WheelState>,
}

impl TimerWheel {
    /// Creates an empty wheel at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms an unnamed timer that fires `interval` ticks from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectDestroyed`] if `owner` was destroyed.
    pub fn arm<F>(&self, owner: &Object, interval: u32, callback: F) -> Result<TimerHandle>
    where
        F: FnMut(&TimerEvent) -> TimerAction + Send + 'static,
    {
        self.arm_with(owner, TimerOptions::new(interval), callback)
    }

    /// Arms a timer with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectDestroyed`] if `owner` was destroyed.
    pub fn arm_with<F>(&self, owner: &Object, options: TimerOptions, callback: F) -> Result<TimerHandle>
    where
        F: FnMut(&TimerEvent) -> TimerAction + Send + 'static,
    {
        let mut owner_state = owner.state();
        if owner_state.destroyed {
            return Err(Error::ObjectDestroyed(owner_state.name.clone()));
        }

        let mut wheel = lock(&self.state);
        let id = TimerId(wheel.next_id);
        wheel.next_id += 1;
        let key = wheel.schedule(id, options.interval);
        wheel.entries.insert(
            id,
            TimerEntry {
                name: options.name,
                owner: Arc::downgrade(&owner.inner),
                owner_id: owner.id(),
                interval: options.interval,
                key,
                survive_detach: options.survive_detach,
                auto_free: options.auto_free,
                running: false,
                restart: None,
                callback: Some(Box::new(callback)),
            },
        );
        owner_state.timers.push(id);
        trace!(timer = id.0, owner = %owner_state.name, due = key.0, "armed timer");
        Ok(id)
    }

    /// Cancels a timer.
    ///
    /// Once this returns the timer will not fire again. A callback already
    /// running is not interrupted. Returns whether the timer was armed;
    /// cancelling a fired one-shot or an already cancelled timer is a
    /// no-op.
    pub fn cancel(&self, id: TimerHandle) -> bool {
        let entry = lock(&self.state).remove(id);
        let Some(entry) = entry else {
            return false;
        };
        if let Some(owner) = entry.owner.upgrade() {
            lock(&owner.state).timers.retain(|t| *t != id);
        }
        trace!(timer = id.0, "cancelled timer");
        true
    }

    /// Moves a timer's next expiry to `interval` ticks from now, and makes
    /// that its new interval.
    ///
    /// Called from the timer's own callback, this takes precedence over
    /// the action the callback returns. Returns whether the timer exists.
    pub fn reschedule(&self, id: TimerHandle, interval: u32) -> bool {
        let mut wheel = lock(&self.state);
        let Some(entry) = wheel.entries.get_mut(&id) else {
            return false;
        };
        if entry.running {
            entry.restart = Some(interval);
            return true;
        }
        entry.interval = interval;
        let old = entry.key;
        wheel.pending.remove(&old);
        let key = wheel.schedule(id, interval);
        if let Some(entry) = wheel.entries.get_mut(&id) {
            entry.key = key;
        }
        true
    }

    /// Cancels the timers among `ids` not flagged to survive detach.
    ///
    /// Returns the cancelled ids. Owner timer lists are left to the caller.
    pub(crate) fn cancel_on_detach(&self, ids: &[TimerId]) -> Vec<TimerId> {
        if ids.is_empty() {
            return Vec::new();
        }
        let mut wheel = lock(&self.state);
        let mut cancelled = Vec::new();
        for &id in ids {
            if wheel.entries.get(&id).is_some_and(|e| !e.survive_detach) {
                wheel.remove(id);
                cancelled.push(id);
            }
        }
        if !cancelled.is_empty() {
            trace!(count = cancelled.len(), "cancelled timers on detach");
        }
        cancelled
    }

    /// Advances the clock to `now` and fires every timer due by then.
    ///
    /// Timers fire in expiry order, ties broken by arming order. Timers
    /// armed or re-armed during the call wait for the next one, even with
    /// interval 0. Returns the number of callbacks run.
    pub fn process_expired(&self, now: u32) -> usize {
        let limit = {
            let mut wheel = lock(&self.state);
            wheel.advance(now);
            // Anything scheduled from here on waits for a later call.
            (wheel.clock, wheel.next_seq)
        };

        let mut fired = 0;
        while let Some(due) = self.take_due(limit) {
            let (id, mut callback, event) = due;
            let action = callback(&event);
            fired += 1;
            trace!(timer = id.0, name = %event.name, ?action, "fired timer");
            drop(event);
            self.commit(id, callback, action);
        }
        fired
    }

    fn take_due(&self, limit: (u64, u64)) -> Option<(TimerId, TimerCallback, TimerEvent)> {
        let mut wheel = lock(&self.state);
        loop {
            let (&key, &id) = wheel.pending.first_key_value()?;
            // Keys sort by expiry, so the first key past the clock ends the
            // scan. A key armed during this call can only sit behind every
            // older key due by now.
            if key.0 > limit.0 || key.1 >= limit.1 {
                return None;
            }
            wheel.pending.remove(&key);
            let now = wheel.now();

            let Some(entry) = wheel.entries.get_mut(&id) else {
                continue;
            };
            let owner = entry.owner.upgrade().map(|inner| Object { inner });
            if owner.is_none() && !entry.survive_detach {
                wheel.entries.remove(&id);
                continue;
            }
            let Some(callback) = entry.callback.take() else {
                continue;
            };
            entry.running = true;
            let event = TimerEvent {
                id,
                name: entry.name.clone(),
                owner,
                tick: now,
                scheduled_at: key.0 as u32,
            };
            return Some((id, callback, event));
        }
    }

    fn commit(&self, id: TimerId, callback: TimerCallback, action: TimerAction) {
        let finished = {
            let mut wheel = lock(&self.state);
            let Some(entry) = wheel.entries.get_mut(&id) else {
                // Cancelled while running.
                return;
            };
            let next = match (entry.restart.take(), action) {
                (Some(interval), _) => Some(interval),
                _ if entry.auto_free => None,
                (None, TimerAction::Stop | TimerAction::Reschedule(0)) => None,
                (None, TimerAction::Repeat) => Some(entry.interval),
                (None, TimerAction::Reschedule(n)) => Some(n),
            };
            match next {
                Some(interval) => {
                    entry.interval = interval;
                    entry.running = false;
                    entry.callback = Some(callback);
                    let key = wheel.schedule(id, interval);
                    if let Some(entry) = wheel.entries.get_mut(&id) {
                        entry.key = key;
                    }
                    None
                }
                None => wheel.entries.remove(&id),
            }
        };
        if let Some(owner) = finished.and_then(|entry| entry.owner.upgrade()) {
            lock(&owner.state).timers.retain(|t| *t != id);
        }
    }

    /// Returns whether a timer is armed (or running).
    #[must_use]
    pub fn is_pending(&self, id: TimerHandle) -> bool {
        lock(&self.state).entries.contains_key(&id)
    }

    /// Returns the number of armed timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Returns the tick of the earliest pending expiry.
    #[must_use]
    pub fn next_expiry(&self) -> Option<u32> {
        lock(&self.state)
            .pending
            .first_key_value()
            .map(|(key, _)| key.0 as u32)
    }

    /// Returns the tick a timer is next due at.
    #[must_use]
    pub fn scheduled_at(&self, id: TimerHandle) -> Option<u32> {
        lock(&self.state)
            .entries
            .get(&id)
            .filter(|e| !e.running)
            .map(|e| e.key.0 as u32)
    }

    /// Returns the tick passed to the last [`TimerWheel::process_expired`].
    #[must_use]
    pub fn now(&self) -> u32 {
        lock(&self.state).now()
    }

    /// Returns the timers owned by `owner`, in arming order.
    #[must_use]
    pub fn timers_of(&self, owner: &Object) -> Vec<TimerHandle> {
        owner.state().timers.clone()
    }

    /// Returns the first armed timer of `owner` named `name`.
    #[must_use]
    pub fn find(&self, owner: &Object, name: &str) -> Option<TimerHandle> {
        let owned = self.timers_of(owner);
        let wheel = lock(&self.state);
        owned.into_iter().find(|id| {
            wheel
                .entries
                .get(id)
                .is_some_and(|e| e.owner_id == owner.id() && e.name == name)
        })
    }
}

impl fmt::Debug for TimerWheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wheel = lock(&self.state);
        f.debug_struct("TimerWheel")
            .field("now", &wheel.now())
            .field("armed", &wheel.entries.len())
            .finish()
    }
}
