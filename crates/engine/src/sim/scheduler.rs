use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TICKS_PER_SECOND: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEntry<C> {
    pub handle: CallbackHandle,
    pub tick: u64,
    pub seq: u64,
    #[serde(default)]
    pub interval: Option<u64>,
    pub callback: C,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCallback<C> {
    pub handle: CallbackHandle,
    pub callback: C,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot<C> {
    pub cur_tick: u64,
    pub next_seq: u64,
    pub next_handle: u64,
    pub entries: Vec<ScheduledEntry<C>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("entry {handle} is due at tick {tick}, which is not after the current tick {cur_tick}")]
    EntryInPast {
        handle: u64,
        tick: u64,
        cur_tick: u64,
    },
    #[error("entry {handle} has sequence {seq} >= next_seq {next_seq}")]
    SequenceOutOfRange { handle: u64, seq: u64, next_seq: u64 },
    #[error("entry handle {handle} >= next_handle {next_handle}")]
    HandleOutOfRange { handle: u64, next_handle: u64 },
    #[error("duplicate callback handle {handle}")]
    DuplicateHandle { handle: u64 },
    #[error("duplicate queue slot tick={tick} seq={seq}")]
    DuplicateSlot { tick: u64, seq: u64 },
    #[error("entry {handle} repeats with interval 0")]
    ZeroInterval { handle: u64 },
}

/// Discrete-event queue keyed by `(tick, seq)`.
///
/// `cur_tick` is the last tick that started. Entries are popped in ascending key order, so
/// callbacks due on the same tick run in registration order.
#[derive(Debug, Clone)]
pub struct Scheduler<C> {
    cur_tick: u64,
    next_seq: u64,
    next_handle: u64,
    queue: BTreeMap<(u64, u64), ScheduledEntry<C>>,
    ticking: bool,
    late_init_pending: bool,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            cur_tick: 0,
            next_seq: 0,
            next_handle: 1,
            queue: BTreeMap::new(),
            ticking: false,
            late_init_pending: false,
        }
    }
}

impl<C: Clone> Scheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cur_tick(&self) -> u64 {
        self.cur_tick
    }

    /// Queues `callback` to run `delay` ticks from now.
    ///
    /// A zero delay inside a tick runs later in the same tick; outside a tick it runs on the next
    /// one. `repeat` re-queues the callback every `interval` ticks after each run.
    pub fn add_callback(&mut self, callback: C, delay: u64, repeat: Option<u64>) -> CallbackHandle {
        let delay = if self.ticking { delay } else { delay.max(1) };
        let handle = CallbackHandle(self.next_handle);
        self.next_handle += 1;
        let tick = self.cur_tick + delay;
        self.push(ScheduledEntry {
            handle,
            tick,
            seq: 0,
            interval: repeat.map(|interval| interval.max(1)),
            callback,
        });
        handle
    }

    fn push(&mut self, mut entry: ScheduledEntry<C>) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((entry.tick, entry.seq), entry);
    }

    pub fn begin_tick(&mut self) -> u64 {
        self.cur_tick += 1;
        self.ticking = true;
        self.cur_tick
    }

    pub fn end_tick(&mut self) {
        self.ticking = false;
    }

    /// Next callback due on the current tick. Repeating entries are re-queued before they are
    /// handed out, so the callback itself may cancel them through its handle.
    pub fn pop_due(&mut self) -> Option<DueCallback<C>> {
        let key = *self.queue.keys().next()?;
        if key.0 > self.cur_tick {
            return None;
        }
        let entry = self.queue.remove(&key)?;
        if let Some(interval) = entry.interval {
            self.push(ScheduledEntry {
                handle: entry.handle,
                tick: self.cur_tick + interval,
                seq: 0,
                interval: entry.interval,
                callback: entry.callback.clone(),
            });
        }
        Some(DueCallback {
            handle: entry.handle,
            callback: entry.callback,
        })
    }

    pub fn remove_callback(&mut self, handle: CallbackHandle) -> bool {
        let before = self.queue.len();
        self.queue.retain(|_, entry| entry.handle != handle);
        before != self.queue.len()
    }

    pub fn remove_matching(&mut self, mut predicate: impl FnMut(&C) -> bool) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, entry| !predicate(&entry.callback));
        before - self.queue.len()
    }

    pub fn has_matching(&self, mut predicate: impl FnMut(&C) -> bool) -> bool {
        self.queue.values().any(|entry| predicate(&entry.callback))
    }

    /// Pending entries in execution order.
    pub fn entries(&self) -> impl Iterator<Item = &ScheduledEntry<C>> {
        self.queue.values()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn mark_late_init_pending(&mut self) {
        self.late_init_pending = true;
    }

    pub fn late_init_pending(&self) -> bool {
        self.late_init_pending
    }

    /// Returns whether late init was pending and clears the flag.
    pub fn take_late_init_pending(&mut self) -> bool {
        std::mem::take(&mut self.late_init_pending)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot<C> {
        SchedulerSnapshot {
            cur_tick: self.cur_tick,
            next_seq: self.next_seq,
            next_handle: self.next_handle,
            entries: self.queue.values().cloned().collect(),
        }
    }

    pub fn restore(snapshot: SchedulerSnapshot<C>) -> Result<Self, SchedulerError> {
        let mut handles = BTreeSet::new();
        let mut queue = BTreeMap::new();
        for entry in snapshot.entries {
            let handle = entry.handle.0;
            if entry.tick <= snapshot.cur_tick {
                return Err(SchedulerError::EntryInPast {
                    handle,
                    tick: entry.tick,
                    cur_tick: snapshot.cur_tick,
                });
            }
            if entry.seq >= snapshot.next_seq {
                return Err(SchedulerError::SequenceOutOfRange {
                    handle,
                    seq: entry.seq,
                    next_seq: snapshot.next_seq,
                });
            }
            if handle >= snapshot.next_handle {
                return Err(SchedulerError::HandleOutOfRange {
                    handle,
                    next_handle: snapshot.next_handle,
                });
            }
            if entry.interval == Some(0) {
                return Err(SchedulerError::ZeroInterval { handle });
            }
            if !handles.insert(handle) {
                return Err(SchedulerError::DuplicateHandle { handle });
            }
            let key = (entry.tick, entry.seq);
            if queue.insert(key, entry).is_some() {
                return Err(SchedulerError::DuplicateSlot {
                    tick: key.0,
                    seq: key.1,
                });
            }
        }
        Ok(Self {
            cur_tick: snapshot.cur_tick,
            next_seq: snapshot.next_seq,
            next_handle: snapshot.next_handle,
            queue,
            ticking: false,
            late_init_pending: false,
        })
    }
}

/// Converts a duration in seconds to whole ticks, rounding to nearest.
pub fn seconds_to_ticks(seconds: f64, ticks_per_second: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    let tps = if ticks_per_second == 0 {
        DEFAULT_TICKS_PER_SECOND
    } else {
        ticks_per_second
    };
    (seconds * f64::from(tps)).round() as u64
}
