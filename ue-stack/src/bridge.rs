/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Synchronous query bridge.
//!
//! A foreign thread that needs a value computed from executor-owned state
//! creates a [`ResultSlot`], enqueues a task holding the slot's
//! [`SlotWriter`], and blocks in [`ResultSlot::wait`].  The executor runs the
//! task, writes the value, and the caller wakes up.  Only the slot is
//! synchronised; the layer state itself is never shared.
//!
//! ```text
//! caller thread                         executor thread
//! ─────────────                         ───────────────
//! slot = ResultSlot::new()
//! push(ue_queue, task(writer)) ───────► pop_next()
//! slot.wait() ┐                         task: writer.put(compute(&mut ctx))
//!             └◄──────────────────────── (slot now holds the value)
//! ```
//!
//! Each call uses its own slot, so concurrent callers can never receive each
//! other's results.  Waiting on a slot from the executor thread deadlocks;
//! this is a documented precondition, not a runtime check.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

/// Why [`ResultSlot::wait`] returned without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotError {
    /// Every writer was dropped before producing a value (e.g. the task was
    /// discarded because the stack shut down).
    #[error("result slot abandoned before a value was written")]
    Abandoned,

    /// No value arrived within the timeout passed to
    /// [`ResultSlot::wait_timeout`].
    #[error("timed out waiting for the result slot")]
    Timeout,
}

/// Capacity-one blocking handoff: one writer, one reader.
#[derive(Debug)]
pub struct ResultSlot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

/// Write end of a [`ResultSlot`], moved into the task that computes the value.
#[derive(Debug)]
pub struct SlotWriter<T> {
    tx: Sender<T>,
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn writer(&self) -> SlotWriter<T> {
        SlotWriter {
            tx: self.tx.clone(),
        }
    }

    /// Blocks until the value is written.
    ///
    /// # Errors
    /// [`SlotError::Abandoned`] if every writer is dropped first.
    pub fn wait(self) -> Result<T, SlotError> {
        let Self { tx, rx } = self;
        // The slot's own sender must go, or an abandoned query never wakes.
        drop(tx);
        rx.recv().map_err(|_| SlotError::Abandoned)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// # Errors
    /// [`SlotError::Timeout`] or [`SlotError::Abandoned`].
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, SlotError> {
        let Self { tx, rx } = self;
        drop(tx);
        rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => SlotError::Timeout,
            RecvTimeoutError::Disconnected => SlotError::Abandoned,
        })
    }
}

impl<T> SlotWriter<T> {
    /// Stores `value` in the slot.
    ///
    /// Returns `false` if the slot already holds a value or its reader is
    /// gone; the value is dropped in that case.
    pub fn put(self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
