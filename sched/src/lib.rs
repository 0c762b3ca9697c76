// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A cycle-driven event scheduler.
//!
//! Time, as far as this crate is concerned, is the emulated CPU's cycle counter and nothing else.
//! Events only come due as [`Scheduler::advance`] is called by whoever is running the CPU, so a
//! paused machine never fires anything.

use serde::{Deserialize, Serialize};

/// The frequency, in Hz, of the SH4 main clock.
///
/// Requesting an event this many cycles out schedules it one second of emulated time from now.
pub const SH4_MAIN_CLOCK: u64 = 200_000_000;

/// The function invoked when an event comes due.
///
/// The return value, if any, is the number of cycles after which the same event should fire
/// again.
pub type Callback<C> = fn(ctx: &mut C, tag: i32) -> Option<u64>;

/// An opaque reference to a registered callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(usize);

/// The serialized form of a single scheduler slot.
///
/// The deadline is stored relative to the cycle counter at the time of saving so that a record
/// may be restored into a scheduler whose counter has a different origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub tag: i32,
    /// Cycles left until the event fires, or `None` if it was not scheduled.
    pub remaining: Option<u64>,
}

struct Slot<C> {
    tag: i32,
    callback: Callback<C>,
    deadline: Option<u64>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self { now: 0, slots: Vec::new() }
    }
}

/// Deferred callbacks keyed to the emulated cycle counter.
///
/// `C` is the context handed to every callback. The scheduler does not own it; it is lent to
/// [`Scheduler::advance`] by the caller for the duration of the call.
pub struct Scheduler<C> {
    now: u64,
    slots: Vec<Option<Slot<C>>>,
}

impl<C> Scheduler<C> {
    /// The current value of the cycle counter.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Registers a callback and returns the handle through which it is scheduled.
    ///
    /// The new slot starts out unscheduled.
    pub fn register(&mut self, tag: i32, callback: Callback<C>) -> Handle {
        let slot = Slot { tag, callback, deadline: None };

        // Reuse the first free slot, if any.
        if let Some(idx) = self.slots.iter().position(Option::is_none) {
            self.slots[idx] = Some(slot);

            return Handle(idx);
        }

        self.slots.push(Some(slot));

        Handle(self.slots.len() - 1)
    }

    /// Removes a callback. Any pending event for it is dropped.
    pub fn unregister(&mut self, handle: Handle) {
        if self.slot_mut(handle).is_some() {
            self.slots[handle.0] = None;
        }
    }

    /// Schedules the event for `handle` to fire `cycles` from now, replacing any earlier request.
    ///
    /// `None` cancels a pending event.
    pub fn request(&mut self, handle: Handle, cycles: Option<u64>) {
        let now = self.now;
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };

        slot.deadline = cycles.map(|cycles| now.saturating_add(cycles));
    }

    pub fn is_scheduled(&self, handle: Handle) -> bool {
        self.remaining(handle).is_some()
    }

    /// Cycles left until the event for `handle` fires.
    pub fn remaining(&self, handle: Handle) -> Option<u64> {
        self.slot(handle)
            .and_then(|slot| slot.deadline)
            .map(|deadline| deadline.saturating_sub(self.now))
    }

    /// Runs the clock forward by `cycles`, firing every event that comes due on the way.
    ///
    /// Events fire in deadline order; ties go to the slot registered first. The cycle counter
    /// reads exactly the deadline of an event while its callback runs.
    pub fn advance(&mut self, cycles: u64, ctx: &mut C) {
        let target = self.now.saturating_add(cycles);

        while let Some(idx) = self.next_due(target) {
            let Some(slot) = self.slots[idx].as_mut() else {
                break;
            };
            let Some(deadline) = slot.deadline.take() else {
                break;
            };
            let (tag, callback) = (slot.tag, slot.callback);
            self.now = deadline;

            if let Some(again) = callback(ctx, tag) {
                self.request(Handle(idx), Some(again));
            }
        }

        self.now = target;
    }

    /// Captures the state of one slot for a save state.
    pub fn save(&self, handle: Handle) -> EventRecord {
        EventRecord {
            tag: self.slot(handle).map_or(0, |slot| slot.tag),
            remaining: self.remaining(handle),
        }
    }

    /// Reinstates a slot captured with [`Scheduler::save`].
    pub fn restore(&mut self, handle: Handle, record: &EventRecord) {
        let Some(slot) = self.slot_mut(handle) else {
            return;
        };
        if slot.tag != record.tag {
            tracing::warn!("restoring event with tag {} into slot tagged {}", record.tag, slot.tag);
        }

        self.request(handle, record.remaining);
    }

    fn next_due(&self, target: u64) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| Some((idx, slot.as_ref()?.deadline?)))
            .filter(|(_, deadline)| *deadline <= target)
            .min_by_key(|(idx, deadline)| (*deadline, *idx))
            .map(|(idx, _)| idx)
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<C>> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, handle: Handle) -> Option<&mut Slot<C>> {
        let slot = self.slots.get_mut(handle.0).and_then(Option::as_mut);
        if slot.is_none() {
            tracing::error!("no callback is registered for {:?}", handle);
        }

        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        fired: Vec<i32>,
    }

    fn record(ctx: &mut Log, tag: i32) -> Option<u64> {
        ctx.fired.push(tag);
        None
    }

    fn every_100(ctx: &mut Log, tag: i32) -> Option<u64> {
        ctx.fired.push(tag);
        Some(100)
    }

    #[test]
    fn fires_only_once_deadline_passes() {
        let mut sched = Scheduler::<Log>::new();
        let mut log = Log::default();
        let handle = sched.register(7, record);

        sched.request(handle, Some(1_000));
        sched.advance(999, &mut log);
        assert!(log.fired.is_empty());
        assert_eq!(Some(1), sched.remaining(handle));

        sched.advance(1, &mut log);
        assert_eq!(vec![7], log.fired);
        assert!(!sched.is_scheduled(handle));
        assert_eq!(1_000, sched.now());
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut sched = Scheduler::<Log>::new();
        let mut log = Log::default();
        let late = sched.register(1, record);
        let early = sched.register(2, record);

        sched.request(late, Some(500));
        sched.request(early, Some(200));
        sched.advance(1_000, &mut log);

        assert_eq!(vec![2, 1], log.fired);
    }

    #[test]
    fn callback_can_reschedule_itself() {
        let mut sched = Scheduler::<Log>::new();
        let mut log = Log::default();
        let handle = sched.register(3, every_100);

        sched.request(handle, Some(100));
        sched.advance(350, &mut log);

        assert_eq!(3, log.fired.len());
        assert_eq!(Some(50), sched.remaining(handle));
    }

    #[test]
    fn cancel_drops_pending_event() {
        let mut sched = Scheduler::<Log>::new();
        let mut log = Log::default();
        let handle = sched.register(0, record);

        sched.request(handle, Some(10));
        sched.request(handle, None);
        sched.advance(100, &mut log);

        assert!(log.fired.is_empty());
    }

    #[test]
    fn save_and_restore_keep_remaining_offset() {
        let mut sched = Scheduler::<Log>::new();
        let mut log = Log::default();
        let handle = sched.register(9, record);
        sched.request(handle, Some(SH4_MAIN_CLOCK));
        sched.advance(SH4_MAIN_CLOCK / 4, &mut log);

        let saved = sched.save(handle);
        assert_eq!(Some(SH4_MAIN_CLOCK - SH4_MAIN_CLOCK / 4), saved.remaining);

        let mut restored = Scheduler::<Log>::new();
        let handle = restored.register(9, record);
        restored.restore(handle, &saved);

        restored.advance(SH4_MAIN_CLOCK - SH4_MAIN_CLOCK / 4 - 1, &mut log);
        assert!(log.fired.is_empty());
        restored.advance(1, &mut log);
        assert_eq!(1, log.fired.len());
    }

    #[test]
    fn unregistered_slots_are_reused() {
        let mut sched = Scheduler::<Log>::new();
        let first = sched.register(0, record);
        let second = sched.register(1, record);
        sched.unregister(first);

        assert_eq!(first, sched.register(2, record));
        assert_ne!(first, second);
        assert!(!sched.is_scheduled(first));
    }
}
