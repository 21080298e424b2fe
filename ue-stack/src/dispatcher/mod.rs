/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Multi-queue task dispatcher.
//!
//! [`TaskDispatcher`] holds a set of named, bounded FIFO queues.  Each
//! producer class (radio sync, IP uplink, foreign-thread requests, background
//! completions, MAC) writes to its own queue, and exactly one consumer (the
//! executor thread) drains all of them through [`pop_next`].
//!
//! # Ordering
//!
//! | Scope | Guarantee |
//! |---|---|
//! | Within one queue | strict FIFO |
//! | Across queues | round-robin: a non-empty queue is served at least once every `queue_count` pops |
//!
//! No priority is given to any queue.  A flooded sync queue therefore cannot
//! starve the uplink queue, and vice versa.
//!
//! # Backpressure
//!
//! [`try_push`] never blocks and hands the task back inside
//! [`PushError::Full`] when the queue is at capacity; the caller decides
//! whether to drop it.  [`push_blocking`] parks the producer until the
//! consumer frees a slot.
//!
//! [`pop_next`]: TaskDispatcher::pop_next
//! [`try_push`]: TaskDispatcher::try_push
//! [`push_blocking`]: TaskDispatcher::push_blocking

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, warn};

// ── Queue identity ────────────────────────────────────────────────────────────

/// Source of the per-dispatcher tag carried by every [`QueueId`].
static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque handle of one registered queue.
///
/// Only [`TaskDispatcher::register_queue`] creates these.  The id remembers
/// which dispatcher issued it, so it addresses nothing in any other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId {
    dispatcher: u64,
    index: usize,
}

impl QueueId {
    /// Registration index of the queue (0 for the first registered queue).
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.index)
    }
}

// ── Error type ────────────────────────────────────────────────────────────────

/// Why a push did not enqueue the task.  The task is always handed back.
pub enum PushError<T> {
    /// The queue is at capacity (non-blocking push only).
    Full(T),

    /// The dispatcher has been closed; nothing will be delivered any more.
    Closed(T),

    /// The [`QueueId`] was not issued by this dispatcher.
    UnknownQueue(T),
}

impl<T> PushError<T> {
    /// Recovers the rejected task.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(t) | PushError::Closed(t) | PushError::UnknownQueue(t) => t,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PushError::Closed(_))
    }
}

// Tasks are usually boxed closures without `Debug`, so the payload is elided.
impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
            PushError::UnknownQueue(_) => f.write_str("UnknownQueue(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "queue is full"),
            PushError::Closed(_) => write!(f, "dispatcher is closed"),
            PushError::UnknownQueue(_) => write!(f, "queue was not registered with this dispatcher"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

// ── Diagnostics ───────────────────────────────────────────────────────────────

/// Occupancy of one queue at the time of a [`TaskDispatcher::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub name: String,
    pub depth: usize,
    pub capacity: usize,
}

// ── Internal state ────────────────────────────────────────────────────────────

struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> BoundedQueue<T> {
    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

struct Inner<T> {
    queues: Vec<BoundedQueue<T>>,
    /// Index of the queue the next pop starts scanning from.
    cursor: usize,
    closed: bool,
}

impl<T> Inner<T> {
    /// Round-robin selection: scan from `cursor`, take the head of the first
    /// non-empty queue, and move the cursor past it.
    fn pop_round_robin(&mut self) -> Option<T> {
        let n = self.queues.len();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            if let Some(task) = self.queues[idx].items.pop_front() {
                self.cursor = (idx + 1) % n;
                return Some(task);
            }
        }
        None
    }
}

// ── TaskDispatcher ────────────────────────────────────────────────────────────

/// Bounded multi-producer / single-consumer task queues.
///
/// All queues share one mutex: the consumer needs an atomic view across
/// queues to apply the round-robin policy, and contention is limited to the
/// handful of producer threads of one stack.
pub struct TaskDispatcher<T> {
    id: u64,
    inner: Mutex<Inner<T>>,
    /// Signalled when a task is pushed or the dispatcher is closed.
    not_empty: Condvar,
    /// Signalled when a task is popped or the dispatcher is closed.
    not_full: Condvar,
}

impl<T> Default for TaskDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TaskDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("queues", &self.snapshot())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> TaskDispatcher<T> {
    /// Creates a dispatcher with no queues.
    pub fn new() -> Self {
        Self {
            id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(Inner {
                queues: Vec::new(),
                cursor: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Registers a new FIFO holding at most `capacity` tasks (minimum 1).
    ///
    /// Intended to be called during setup, before the consumer starts.
    pub fn register_queue(&self, name: impl Into<String>, capacity: usize) -> QueueId {
        let mut inner = self.inner.lock();
        let id = QueueId {
            dispatcher: self.id,
            index: inner.queues.len(),
        };
        let name = name.into();
        debug!(queue = %name, id = id.index(), capacity, "queue registered");
        inner.queues.push(BoundedQueue {
            name,
            capacity: capacity.max(1),
            items: VecDeque::with_capacity(capacity.max(1)),
        });
        id
    }

    /// Position of `queue` in this dispatcher, `None` if another dispatcher
    /// issued it.
    fn local_index(&self, queue: QueueId) -> Option<usize> {
        (queue.dispatcher == self.id).then_some(queue.index)
    }

    /// Enqueues `task` without blocking.
    ///
    /// # Errors
    /// [`PushError::Full`] when the queue is at capacity (its depth is left
    /// unchanged), [`PushError::Closed`] after [`close`](Self::close),
    /// [`PushError::UnknownQueue`] for a foreign [`QueueId`].
    pub fn try_push(&self, queue: QueueId, task: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PushError::Closed(task));
        }
        let Some(q) = self.local_index(queue).and_then(|i| inner.queues.get_mut(i)) else {
            return Err(PushError::UnknownQueue(task));
        };
        if q.is_full() {
            return Err(PushError::Full(task));
        }
        q.items.push_back(task);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueues `task`, parking the caller while the queue is full.
    ///
    /// # Errors
    /// [`PushError::Closed`] if the dispatcher is (or becomes) closed while
    /// waiting, [`PushError::UnknownQueue`] for a foreign [`QueueId`].
    pub fn push_blocking(&self, queue: QueueId, task: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(PushError::Closed(task));
            }
            let Some(q) = self.local_index(queue).and_then(|i| inner.queues.get_mut(i)) else {
                return Err(PushError::UnknownQueue(task));
            };
            if !q.is_full() {
                q.items.push_back(task);
                drop(inner);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut inner);
        }
    }

    /// Blocks until any queue holds a task and returns it.
    ///
    /// Returns `None` once the dispatcher is closed.  Must only be called by
    /// the single consumer.
    pub fn pop_next(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(task) = inner.pop_round_robin() {
                drop(inner);
                self.not_full.notify_all();
                return Some(task);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Non-blocking variant of [`pop_next`](Self::pop_next).
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        let task = inner.pop_round_robin();
        drop(inner);
        if task.is_some() {
            self.not_full.notify_all();
        }
        task
    }

    /// Instantaneous number of tasks waiting in `queue` (0 for an unknown id).
    pub fn depth(&self, queue: QueueId) -> usize {
        let Some(index) = self.local_index(queue) else {
            return 0;
        };
        self.inner.lock().queues.get(index).map_or(0, |q| q.items.len())
    }

    /// Configured capacity of `queue` (0 for an unknown id).
    pub fn capacity(&self, queue: QueueId) -> usize {
        let Some(index) = self.local_index(queue) else {
            return 0;
        };
        self.inner.lock().queues.get(index).map_or(0, |q| q.capacity)
    }

    /// Total number of waiting tasks across all queues.
    pub fn len(&self) -> usize {
        self.inner.lock().queues.iter().map(|q| q.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn queue_count(&self) -> usize {
        self.inner.lock().queues.len()
    }

    /// Per-queue occupancy, in registration order.
    pub fn snapshot(&self) -> Vec<QueueDepth> {
        self.inner
            .lock()
            .queues
            .iter()
            .map(|q| QueueDepth {
                name: q.name.clone(),
                depth: q.items.len(),
                capacity: q.capacity,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Closes the dispatcher: further pushes fail with `Closed`, every
    /// blocked producer and the consumer wake up, and undelivered tasks are
    /// dropped.
    ///
    /// Returns the number of dropped tasks.  Idempotent.
    pub fn close(&self) -> usize {
        let pending: Vec<T> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner
                .queues
                .iter_mut()
                .flat_map(|q| q.items.drain(..))
                .collect()
        };
        self.not_empty.notify_all();
        self.not_full.notify_all();

        let dropped = pending.len();
        if dropped > 0 {
            warn!(dropped, "dispatcher closed with undelivered tasks");
        }
        // Task destructors run outside the lock.
        drop(pending);
        dropped
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
