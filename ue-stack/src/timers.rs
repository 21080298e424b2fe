/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Tick-driven countdown timers.
//!
//! The executor steps every running timer by exactly one tick per sub-tick
//! (see [`StackContext::run_tti`](crate::executor::StackContext::run_tti)),
//! so timers keep tick-accurate semantics even when the radio clock delivers
//! ticks in a burst.  Expiry callbacks run on the executor thread with
//! exclusive access to the context `C` (the protocol layers in production).
//!
//! Slots are recycled; a [`TimerId`] carries a generation counter so a stale
//! id of a released timer never addresses its successor.

use std::fmt;

/// Callback invoked when a timer expires.
pub type TimerCallback<C> = Box<dyn FnMut(&mut C) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running,
    Expired,
}

struct TimerSlot<C> {
    generation: u32,
    in_use: bool,
    one_shot: bool,
    duration: u32,
    remaining: u32,
    state: TimerState,
    callback: Option<TimerCallback<C>>,
}

impl<C> TimerSlot<C> {
    fn vacant() -> Self {
        Self {
            generation: 0,
            in_use: false,
            one_shot: false,
            duration: 0,
            remaining: 0,
            state: TimerState::Idle,
            callback: None,
        }
    }
}

pub struct TimerFacility<C> {
    slots: Vec<TimerSlot<C>>,
    free: Vec<usize>,
}

impl<C> fmt::Debug for TimerFacility<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerFacility")
            .field("timers", &self.nof_timers())
            .field("running", &self.nof_running())
            .finish()
    }
}

impl<C> TimerFacility<C> {
    /// Pre-allocates `capacity` slots; the facility grows beyond that on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots: Vec<_> = (0..capacity).map(|_| TimerSlot::vacant()).collect();
        // Reversed so the lowest index is handed out first.
        let free = (0..capacity).rev().collect();
        Self { slots, free }
    }

    /// Allocates an idle timer with no duration and no callback.
    pub fn create(&mut self) -> TimerId {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slots.push(TimerSlot::vacant());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.in_use = true;
        slot.one_shot = false;
        slot.duration = 0;
        slot.remaining = 0;
        slot.state = TimerState::Idle;
        slot.callback = None;
        TimerId {
            index,
            generation: slot.generation,
        }
    }

    fn slot_mut(&mut self, id: TimerId) -> Option<&mut TimerSlot<C>> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.in_use && s.generation == id.generation)
    }

    fn slot(&self, id: TimerId) -> Option<&TimerSlot<C>> {
        self.slots
            .get(id.index)
            .filter(|s| s.in_use && s.generation == id.generation)
    }

    /// Configures `id` with a duration in ticks and an optional expiry
    /// callback.  The timer is stopped; call [`run`](Self::run) to start it.
    ///
    /// Returns `false` for an unknown or released id.
    pub fn set(&mut self, id: TimerId, duration_ticks: u32, callback: Option<TimerCallback<C>>) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        slot.duration = duration_ticks;
        slot.remaining = duration_ticks;
        slot.state = TimerState::Idle;
        slot.callback = callback;
        true
    }

    /// Starts (or restarts) the countdown from the configured duration.
    pub fn run(&mut self, id: TimerId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        slot.remaining = slot.duration;
        slot.state = TimerState::Running;
        true
    }

    /// Stops the countdown without firing the callback.
    pub fn stop(&mut self, id: TimerId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.state = TimerState::Idle;
        }
    }

    /// Frees the slot.  `id` is invalid afterwards.
    pub fn release(&mut self, id: TimerId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.in_use = false;
            slot.callback = None;
            slot.state = TimerState::Idle;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.slot(id).is_some_and(|s| s.state == TimerState::Running)
    }

    pub fn is_expired(&self, id: TimerId) -> bool {
        self.slot(id).is_some_and(|s| s.state == TimerState::Expired)
    }

    /// Ticks left before a running timer expires.
    pub fn remaining(&self, id: TimerId) -> Option<u32> {
        self.slot(id)
            .filter(|s| s.state == TimerState::Running)
            .map(|s| s.remaining)
    }

    /// Runs `callback` once after `duration_ticks` ticks; the timer releases
    /// itself after firing.
    pub fn defer_callback<F>(&mut self, duration_ticks: u32, callback: F) -> TimerId
    where
        F: FnOnce(&mut C) + Send + 'static,
        C: 'static,
    {
        let mut callback = Some(callback);
        let id = self.create();
        self.set(
            id,
            duration_ticks,
            Some(Box::new(move |ctx: &mut C| {
                if let Some(cb) = callback.take() {
                    cb(ctx);
                }
            })),
        );
        if let Some(slot) = self.slot_mut(id) {
            slot.one_shot = true;
        }
        self.run(id);
        id
    }

    /// Advances every running timer by one tick and fires the callbacks of
    /// those reaching zero.  Returns the number of timers that expired.
    ///
    /// A timer with duration 0 or 1 expires on the first step after `run`.
    pub fn step_all(&mut self, ctx: &mut C) -> usize {
        let mut expired = 0;
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if !slot.in_use || slot.state != TimerState::Running {
                continue;
            }
            slot.remaining = slot.remaining.saturating_sub(1);
            if slot.remaining > 0 {
                continue;
            }

            slot.state = TimerState::Expired;
            expired += 1;
            let id = TimerId {
                index,
                generation: slot.generation,
            };
            let one_shot = slot.one_shot;

            if let Some(mut cb) = slot.callback.take() {
                cb(ctx);
                if !one_shot {
                    if let Some(slot) = self.slot_mut(id) {
                        slot.callback = Some(cb);
                    }
                }
            }
            if one_shot {
                self.release(id);
            }
        }
        expired
    }

    /// Number of allocated timers.
    pub fn nof_timers(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    pub fn nof_running(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.in_use && s.state == TimerState::Running)
            .count()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
