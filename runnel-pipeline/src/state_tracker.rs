// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `state_tracker` module aggregates the liveness of a whole pipeline.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use runnel_core::units::{monotonic_now, Nanoseconds};
use runnel_io::device::DeviceState;

const HALT_NONE: u32 = 0;

/// Pipeline state tracker.
///
/// All slots, endpoints, and sessions of a pipeline pass state updates to the tracker,
/// so that the top-level source or sink can quickly decide whether there is any ongoing
/// activity, or it can sleep.
///
/// Counter updates are atomic and may come from any thread, including the network
/// thread. Readers observe monotonic snapshots: a torn transition is tolerated because
/// the only consumer is a state decision that is re-evaluated.
pub struct StateTracker {
    halt_state: AtomicU32,

    active_sessions: AtomicI64,
    pending_packets: AtomicI64,

    // Mask the current waiter is interested in, if any. A single concurrent waiter is
    // supported.
    waiting_mask: AtomicU32,

    mutex: Mutex<()>,
    cond: Condvar,
}

impl Default for StateTracker {
    fn default() -> Self {
        StateTracker::new()
    }
}

impl StateTracker {
    /// Create a tracker with all counters at zero.
    pub fn new() -> Self {
        StateTracker {
            halt_state: AtomicU32::new(HALT_NONE),
            active_sessions: AtomicI64::new(0),
            pending_packets: AtomicI64::new(0),
            waiting_mask: AtomicU32::new(0),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Compute the current aggregate state.
    pub fn get_state(&self) -> DeviceState {
        match self.halt_state.load(Ordering::Acquire) {
            HALT_NONE => {}
            bits if bits == DeviceState::Broken.mask() => return DeviceState::Broken,
            _ => return DeviceState::Closed,
        }

        if self.active_sessions.load(Ordering::Acquire) != 0 {
            // There are sessions and they're producing sound.
            return DeviceState::Active;
        }

        if self.pending_packets.load(Ordering::Acquire) != 0 {
            // No sessions yet, but there are packets that may create some.
            return DeviceState::Active;
        }

        // No sessions and no packets; safe to sleep until there are some.
        DeviceState::Idle
    }

    /// Check if the pipeline was neither marked broken nor closed.
    pub fn is_usable(&self) -> bool {
        self.halt_state.load(Ordering::Acquire) == HALT_NONE
    }

    /// Check if the pipeline was closed.
    pub fn is_closed(&self) -> bool {
        self.halt_state.load(Ordering::Acquire) == DeviceState::Closed.mask()
    }

    /// Mark the pipeline broken.
    pub fn set_broken(&self) {
        self.halt_state.store(DeviceState::Broken.mask(), Ordering::Release);
        self.signal_state_change();
    }

    /// Mark the pipeline closed.
    pub fn set_closed(&self) {
        self.halt_state.store(DeviceState::Closed.mask(), Ordering::Release);
        self.signal_state_change();
    }

    /// Get the number of sessions currently producing signal.
    pub fn num_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire) as usize
    }

    /// Account for a session that started producing signal.
    pub fn register_session(&self) {
        if self.active_sessions.fetch_add(1, Ordering::AcqRel) == 0 {
            self.signal_state_change();
        }
    }

    /// Account for a session that stopped producing signal.
    pub fn unregister_session(&self) {
        let prev_sessions = self.active_sessions.fetch_sub(1, Ordering::AcqRel);

        if prev_sessions == 0 {
            panic!("state tracker: unpaired register/unregister session");
        }

        if prev_sessions == 1 && self.pending_packets.load(Ordering::Acquire) == 0 {
            self.signal_state_change();
        }
    }

    /// Account for a packet waiting to be depacketized.
    pub fn register_packet(&self) {
        if self.pending_packets.fetch_add(1, Ordering::AcqRel) == 0
            && self.active_sessions.load(Ordering::Acquire) == 0
        {
            self.signal_state_change();
        }
    }

    /// Account for a packet that was depacketized.
    pub fn unregister_packet(&self) {
        let prev_packets = self.pending_packets.fetch_sub(1, Ordering::AcqRel);

        if prev_packets == 0 {
            panic!("state tracker: unpaired register/unregister packet");
        }

        if prev_packets == 1 && self.active_sessions.load(Ordering::Acquire) == 0 {
            self.signal_state_change();
        }
    }

    /// Block until the aggregate state matches any state in `mask`, or the deadline
    /// passes.
    ///
    /// The mask is a combination of [`DeviceState::mask`] bits. The deadline is an
    /// absolute [`monotonic_now`] timestamp; `None` waits indefinitely. Returns true if
    /// the state matched, false on timeout.
    pub fn wait_state(&self, state_mask: u32, deadline: Option<Nanoseconds>) -> bool {
        if state_mask == 0 {
            return true;
        }

        self.waiting_mask.store(state_mask, Ordering::Release);

        let mut guard = self.mutex.lock();

        let matched = loop {
            if self.get_state().mask() & state_mask != 0 {
                break true;
            }

            match deadline {
                Some(deadline) => {
                    let now = monotonic_now();
                    if deadline <= now {
                        break false;
                    }

                    let timeout = Duration::from_nanos((deadline - now) as u64);
                    self.cond.wait_for(&mut guard, timeout);
                }
                None => {
                    self.cond.wait(&mut guard);
                }
            }
        };

        self.waiting_mask.store(0, Ordering::Release);

        matched
    }

    fn signal_state_change(&self) {
        let waiting_mask = self.waiting_mask.load(Ordering::Acquire);

        if waiting_mask != 0 && self.get_state().mask() & waiting_mask != 0 {
            // The empty critical section pairs with the waiter's check-then-wait,
            // closing the window where a wakeup could be missed.
            drop(self.mutex.lock());
            self.cond.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use runnel_core::units::MILLISECOND;

    #[test]
    fn verify_state_derivation() {
        let tracker = StateTracker::new();

        assert_eq!(tracker.get_state(), DeviceState::Idle);

        tracker.register_packet();
        assert_eq!(tracker.get_state(), DeviceState::Active);

        tracker.register_session();
        tracker.unregister_packet();
        assert_eq!(tracker.get_state(), DeviceState::Active);
        assert_eq!(tracker.num_sessions(), 1);

        tracker.unregister_session();
        assert_eq!(tracker.get_state(), DeviceState::Idle);
    }

    #[test]
    fn verify_balanced_updates_restore_state() {
        let tracker = StateTracker::new();

        for _ in 0..100 {
            tracker.register_session();
            tracker.register_packet();
        }
        for _ in 0..100 {
            tracker.unregister_packet();
            tracker.unregister_session();
        }

        assert_eq!(tracker.get_state(), DeviceState::Idle);
    }

    #[test]
    #[should_panic]
    fn verify_unpaired_unregister_panics() {
        let tracker = StateTracker::new();

        tracker.unregister_session();
    }

    #[test]
    fn verify_halt_states() {
        let tracker = StateTracker::new();

        tracker.register_session();
        tracker.set_broken();

        assert_eq!(tracker.get_state(), DeviceState::Broken);
        assert!(!tracker.is_usable());
        assert!(!tracker.is_closed());

        tracker.set_closed();
        assert_eq!(tracker.get_state(), DeviceState::Closed);
        assert!(tracker.is_closed());
    }

    #[test]
    fn verify_wait_state_times_out() {
        let tracker = StateTracker::new();

        let deadline = monotonic_now() + 50 * MILLISECOND;

        assert!(!tracker.wait_state(DeviceState::Active.mask(), Some(deadline)));
    }

    #[test]
    fn verify_wait_state_wakes_on_transition() {
        let tracker = Arc::new(StateTracker::new());

        let waker = Arc::clone(&tracker);
        let thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            waker.register_session();
        });

        let deadline = monotonic_now() + 5_000 * MILLISECOND;

        assert!(tracker.wait_state(
            DeviceState::Active.mask() | DeviceState::Paused.mask(),
            Some(deadline),
        ));

        thread.join().unwrap();
    }

    #[test]
    fn verify_wait_state_immediate_match() {
        let tracker = StateTracker::new();

        // An empty mask and an already matching mask both return immediately.
        assert!(tracker.wait_state(0, None));
        assert!(tracker.wait_state(DeviceState::Idle.mask(), None));
    }
}
