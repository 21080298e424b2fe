/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cloneable route into a running stack.
//!
//! [`StackHandle`] is what foreign threads (radio, IP, background workers)
//! and the layers themselves hold.  It never exposes layer state directly;
//! everything goes through a queue of the shared dispatcher, except
//! deferred callbacks, which go straight to the executor's timers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bridge::ResultSlot;
use crate::config::StackConfig;
use crate::dispatcher::{PushError, QueueId, TaskDispatcher};
use crate::executor::{StackContext, StackTask};
use crate::layers::{PhyCell, RadioDriver, StackLayers};
use crate::pool::{WorkerId, WorkerPool};
use crate::targets;

use super::{InitError, LifecycleState, StackError};

/// Room for a handful of control tasks; only shutdown uses it today.
const CONTROL_QUEUE_CAPACITY: usize = 4;

// ── Queues ────────────────────────────────────────────────────────────────────

/// The task queues of a stack, in registration (and round-robin) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Lifecycle tasks (shutdown).
    Control,
    /// Requests from the UE application side: attach, detach, queries.
    Ue,
    /// Radio timing: tick reports and sync notifications.
    Sync,
    /// Uplink SDUs from the IP gateway.
    Gateway,
    /// Work handed over from the MAC layer's own threads.
    Mac,
    /// Results of background-worker operations.
    Background,
}

impl QueueKind {
    pub const ALL: [QueueKind; 6] = [
        QueueKind::Control,
        QueueKind::Ue,
        QueueKind::Sync,
        QueueKind::Gateway,
        QueueKind::Mac,
        QueueKind::Background,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QueueKind::Control => "control",
            QueueKind::Ue => "ue",
            QueueKind::Sync => "sync",
            QueueKind::Gateway => "gw",
            QueueKind::Mac => "mac",
            QueueKind::Background => "background",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// A callback waiting to be armed on the executor's timer facility.
pub(crate) type DeferredCallback = (u32, Box<dyn FnOnce(&mut StackLayers) + Send + 'static>);

struct Shared {
    config: StackConfig,
    dispatcher: TaskDispatcher<StackTask>,
    queues: [QueueId; 6],
    pool: WorkerPool,
    radio: OnceLock<Arc<dyn RadioDriver>>,
    state: Mutex<LifecycleState>,
    /// Deferrals not yet armed.  Drained by the executor after every task
    /// and before every timer step, so a deferral made on the executor
    /// thread counts from the very next sub-tick.
    deferred_tx: Sender<DeferredCallback>,
    deferred_rx: Receiver<DeferredCallback>,
    /// Uplink SDUs refused because the gateway queue was full.
    uplink_dropped: AtomicU64,
}

#[derive(Clone)]
pub struct StackHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for StackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackHandle")
            .field("state", &self.state())
            .field("dispatcher", &self.shared.dispatcher)
            .field("pool", &self.shared.pool)
            .finish_non_exhaustive()
    }
}

impl StackHandle {
    /// Validates `config`, registers the queues and starts the worker pool.
    pub(crate) fn new(config: StackConfig) -> Result<Self, InitError> {
        config.validate().map_err(InitError::Config)?;

        let dispatcher = TaskDispatcher::new();
        let queues = QueueKind::ALL.map(|kind| {
            let capacity = match kind {
                QueueKind::Control => CONTROL_QUEUE_CAPACITY,
                _ => config.queue_capacity,
            };
            dispatcher.register_queue(kind.name(), capacity)
        });

        let pool = WorkerPool::new(config.background_workers).map_err(|source| InitError::Spawn {
            thread: "WORKER",
            source,
        })?;

        let (deferred_tx, deferred_rx) = unbounded();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                dispatcher,
                queues,
                pool,
                radio: OnceLock::new(),
                state: Mutex::new(LifecycleState::Uninitialized),
                deferred_tx,
                deferred_rx,
                uplink_dropped: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.shared.config
    }

    pub(crate) fn dispatcher(&self) -> &TaskDispatcher<StackTask> {
        &self.shared.dispatcher
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.shared.pool
    }

    pub fn queue_id(&self, kind: QueueKind) -> QueueId {
        self.shared.queues[kind.index()]
    }

    /// Tasks currently waiting in `kind`'s queue.
    pub fn queue_depth(&self, kind: QueueKind) -> usize {
        self.shared.dispatcher.depth(self.queue_id(kind))
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.lock()
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        let mut current = self.shared.state.lock();
        let from = *current;
        debug!(target: targets::STACK, %from, to = %state, "lifecycle transition");
        *current = state;
    }

    pub(crate) fn record_uplink_drop(&self) {
        self.shared.uplink_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Uplink SDUs dropped on a full gateway queue since start-up.
    pub fn uplink_dropped(&self) -> u64 {
        self.shared.uplink_dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn set_radio(&self, radio: Arc<dyn RadioDriver>) {
        if self.shared.radio.set(radio).is_err() {
            warn!(target: targets::STACK, "radio driver already attached; keeping the first one");
        }
    }

    // ── Enqueueing ────────────────────────────────────────────────────────────

    /// Enqueues `task` on `kind` without blocking.
    ///
    /// # Errors
    /// The dispatcher's [`PushError`], handing the boxed task back.
    pub fn try_enqueue<F>(&self, kind: QueueKind, task: F) -> Result<(), PushError<StackTask>>
    where
        F: FnOnce(&mut StackContext) + Send + 'static,
    {
        self.shared.dispatcher.try_push(self.queue_id(kind), Box::new(task))
    }

    /// Enqueues `task` on `kind`, waiting while the queue is full.
    ///
    /// # Errors
    /// [`PushError::Closed`] once the stack has shut down.
    pub fn enqueue_blocking<F>(&self, kind: QueueKind, task: F) -> Result<(), PushError<StackTask>>
    where
        F: FnOnce(&mut StackContext) + Send + 'static,
    {
        self.shared.dispatcher.push_blocking(self.queue_id(kind), Box::new(task))
    }

    /// Runs `f` on the executor thread and blocks until it returns.
    ///
    /// Must not be called from the executor thread itself (it would wait for
    /// a task that can only run after it returns).
    ///
    /// # Errors
    /// [`StackError::NotRunning`] if the stack is not running,
    /// [`StackError::QueryAborted`] if shutdown discarded the task.
    pub fn query<R, F>(&self, f: F) -> Result<R, StackError>
    where
        R: Send + 'static,
        F: FnOnce(&mut StackContext) -> R + Send + 'static,
    {
        if self.state() != LifecycleState::Running {
            return Err(StackError::NotRunning);
        }
        let slot = ResultSlot::new();
        let writer = slot.writer();
        self.enqueue_blocking(QueueKind::Ue, move |ctx: &mut StackContext| {
            writer.put(f(ctx));
        })
        .map_err(|_| StackError::NotRunning)?;
        slot.wait().map_err(|_| StackError::QueryAborted)
    }

    // ── Background work ───────────────────────────────────────────────────────

    /// Runs `task` on a background worker.  Returns `false` once the pool has
    /// stopped.
    pub fn submit_background<F>(&self, task: F) -> bool
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        self.shared.pool.push_task(task)
    }

    /// Posts the follow-up of a background operation to the executor.
    /// Blocks while the background queue is full.
    pub fn report_background_result<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut StackContext) + Send + 'static,
    {
        match self.enqueue_blocking(QueueKind::Background, task) {
            Ok(()) => true,
            Err(e) => {
                debug!(target: targets::STACK, "background result dropped: {e}");
                false
            }
        }
    }

    /// Runs `callback` with the layers after `duration_ticks` ticks.
    ///
    /// Layers call this from their hooks on the executor thread; the timer
    /// is armed before the next sub-tick is stepped, whatever is waiting in
    /// the task queues.  Returns `false` once the stack has stopped.
    pub fn defer_callback<F>(&self, duration_ticks: u32, callback: F) -> bool
    where
        F: FnOnce(&mut StackLayers) + Send + 'static,
    {
        if self.state() == LifecycleState::Stopped {
            warn!(target: targets::STACK, duration_ticks, "cannot defer callback: stack stopped");
            return false;
        }
        self.shared
            .deferred_tx
            .send((duration_ticks, Box::new(callback)))
            .is_ok()
    }

    /// Deferrals requested since the last call, in request order.
    pub(crate) fn take_deferred(&self) -> impl Iterator<Item = DeferredCallback> + '_ {
        self.shared.deferred_rx.try_iter()
    }

    // ── Radio procedures ──────────────────────────────────────────────────────

    fn radio(&self) -> Option<Arc<dyn RadioDriver>> {
        let radio = self.shared.radio.get().cloned();
        if radio.is_none() {
            warn!(target: targets::RRC, "no radio driver attached");
        }
        radio
    }

    /// Starts a cell search on a background worker; RRC gets
    /// `cell_search_completed` when it finishes.
    pub fn start_cell_search(&self) -> bool {
        let Some(radio) = self.radio() else {
            return false;
        };
        let handle = self.clone();
        self.submit_background(move |worker| {
            let (result, cell) = radio.cell_search();
            debug!(target: targets::RRC, worker, ?result, pci = cell.pci, "cell search finished");
            handle.report_background_result(move |ctx: &mut StackContext| {
                ctx.layers.rrc.cell_search_completed(result, cell);
            });
        })
    }

    /// Selects `cell` on a background worker; RRC gets
    /// `cell_select_completed` when it finishes.
    pub fn start_cell_select(&self, cell: PhyCell) -> bool {
        let Some(radio) = self.radio() else {
            return false;
        };
        let handle = self.clone();
        self.submit_background(move |worker| {
            let selected = radio.cell_select(&cell);
            debug!(target: targets::RRC, worker, pci = cell.pci, selected, "cell select finished");
            handle.report_background_result(move |ctx: &mut StackContext| {
                ctx.layers.rrc.cell_select_completed(selected);
            });
        })
    }
}
