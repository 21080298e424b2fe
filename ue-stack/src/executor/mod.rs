/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The stack executor.
//!
//! [`StackContext`] is everything the executor thread owns exclusively: the
//! protocol layers, the timer facility, the capture sinks and the tick
//! bookkeeping.  A [`StackTask`] receives `&mut StackContext`, so a task can
//! touch any layer without locks: the borrow checker and the single consumer
//! of the dispatcher together guarantee no other thread can.
//!
//! # Tick processing
//!
//! The radio-timing producer reports `(tti, jump)`.  [`StackContext::run_tti`]
//! processes the `jump` sub-ticks one by one (MAC hook + one timer step each)
//! and then runs the RRC and NAS hooks once for the batch:
//!
//! ```text
//! run_tti(100, 3):  mac(98) timers  mac(99) timers  mac(100) timers  │ rrc  nas
//!                   └──────────── per sub-tick ────────────────────┘ └ per batch ┘
//! ```
//!
//! Callbacks deferred through [`StackHandle::defer_callback`] are armed
//! before every task and before every timer step, so a layer hook deferring
//! by one tick sees its callback fire on the following sub-tick.
//!
//! A panicking task is contained: it is logged and counted, and the
//! executor moves on to the next task.  A query whose closure panicked
//! reports [`StackError::QueryAborted`](crate::StackError::QueryAborted).

pub mod tick;

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::{error, info, warn};

use crate::config::{PcapConfig, TickConfig};
use crate::layers::{CaptureHandle, CaptureSink, CaptureSinks, StackLayers};
use crate::metrics::{ExecutorMetrics, StackMetrics};
use crate::stack::{QueueKind, StackHandle};
use crate::targets;
use crate::timers::{TimerFacility, TimerId};

use tick::{sub_ticks, TickProfiler, TTI_WRAP};

/// A deferred unit of work, run exactly once on the executor thread.
pub type StackTask = Box<dyn FnOnce(&mut StackContext) + Send + 'static>;

// ── StackContext ──────────────────────────────────────────────────────────────

/// State owned by the executor thread.
pub struct StackContext {
    /// Protocol layers.  Public so tasks can reach any layer.
    pub layers: StackLayers,
    /// Timers stepped once per sub-tick; callbacks get the layers.
    pub timers: TimerFacility<StackLayers>,
    /// Sinks supplied at init, until `open_captures` hands them out.
    sinks: CaptureSinks,
    /// Open captures, closed at teardown in this order.
    captures: Vec<CaptureHandle>,
    handle: StackHandle,
    tick_config: TickConfig,
    profiler: TickProfiler,
    current_tti: Option<u32>,
    ticks_processed: u64,
    tasks_executed: u64,
    tasks_panicked: u64,
    long_tick_warnings: u64,
    sync_backlog_warnings: u64,
    running: bool,
}

impl std::fmt::Debug for StackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackContext")
            .field("current_tti", &self.current_tti)
            .field("ticks_processed", &self.ticks_processed)
            .field("tasks_executed", &self.tasks_executed)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl StackContext {
    pub(crate) fn new(layers: StackLayers, sinks: CaptureSinks, handle: StackHandle) -> Self {
        let config = handle.config();
        let timers = TimerFacility::with_capacity(config.timer_capacity);
        let tick_config = config.tick.clone();
        let profiler = TickProfiler::new(tick_config.stat_period, tick_config.warn_threshold());
        Self {
            layers,
            timers,
            sinks,
            captures: Vec::new(),
            handle,
            profiler,
            tick_config,
            current_tti: None,
            ticks_processed: 0,
            tasks_executed: 0,
            tasks_panicked: 0,
            long_tick_warnings: 0,
            sync_backlog_warnings: 0,
            running: true,
        }
    }

    /// Handle to the stack this context belongs to.
    pub fn handle(&self) -> &StackHandle {
        &self.handle
    }

    /// Last tick id reported by the radio clock.
    pub fn current_tti(&self) -> Option<u32> {
        self.current_tti
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs `callback` with the layers after `duration_ticks` ticks.
    pub fn defer_callback<F>(&mut self, duration_ticks: u32, callback: F) -> TimerId
    where
        F: FnOnce(&mut StackLayers) + Send + 'static,
    {
        self.timers.defer_callback(duration_ticks, callback)
    }

    /// Arms the deferrals posted through the handle since the last call.
    fn arm_deferred(&mut self) {
        for (duration_ticks, callback) in self.handle.take_deferred() {
            self.timers.defer_callback(duration_ticks, callback);
        }
    }

    // ── Tick processing ───────────────────────────────────────────────────────

    /// Processes one report of the radio clock: `jump` sub-ticks ending at
    /// `tti`, then the per-batch hooks.
    pub fn run_tti(&mut self, tti: u32, jump: u32) {
        if self.tick_config.time_stats {
            self.profiler.start();
        }
        self.current_tti = Some(tti % TTI_WRAP);

        for sub_tti in sub_ticks(tti, jump) {
            self.layers.mac.run_tti(sub_tti);
            self.arm_deferred();
            self.timers.step_all(&mut self.layers);
            self.ticks_processed += 1;
        }
        // Higher layers work on current state, not per-tick deltas.
        self.layers.rrc.run_tti();
        self.layers.nas.run_tti();

        if let Some(elapsed) = self.profiler.stop() {
            if elapsed > self.profiler.threshold() {
                self.long_tick_warnings += 1;
                warn!(
                    target: targets::MAC,
                    tti,
                    jump,
                    duration_ms = elapsed.as_millis() as u64,
                    "proc_time: detected long tick duration"
                );
            }
        }

        let backlog = self.handle.queue_depth(QueueKind::Sync);
        if backlog > self.tick_config.sync_queue_warn_threshold {
            self.sync_backlog_warnings += 1;
            warn!(
                target: targets::STACK,
                sync_queue_len = backlog,
                "detected slow task processing"
            );
        }
    }

    // ── Diagnostics ───────────────────────────────────────────────────────────

    /// Snapshot of every layer and of the executor itself.
    pub fn metrics(&self) -> StackMetrics {
        StackMetrics {
            mac: self.layers.mac.metrics(),
            rlc: self.layers.rlc.metrics(),
            rrc: self.layers.rrc.metrics(),
            nas: self.layers.nas.metrics(),
            executor: ExecutorMetrics {
                current_tti: self.current_tti,
                ticks_processed: self.ticks_processed,
                tasks_executed: self.tasks_executed,
                tasks_panicked: self.tasks_panicked,
                long_tick_warnings: self.long_tick_warnings,
                sync_backlog_warnings: self.sync_backlog_warnings,
                uplink_dropped: self.handle.uplink_dropped(),
                running_timers: self.timers.nof_running(),
                queues: self.handle.dispatcher().snapshot(),
                tick_stats: self.profiler.stats(),
            },
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens the capture sinks enabled in `pcap` and hands them to MAC and
    /// NAS.  Sinks that are disabled or fail to open are discarded; capture
    /// is diagnostic and never fatal.
    pub(crate) fn open_captures(&mut self, pcap: &PcapConfig) {
        if let Some(capture) = open_capture(self.sinks.mac.take(), pcap.enable, &pcap.filename, "MAC") {
            self.layers.mac.start_pcap(capture.clone());
            self.captures.push(capture);
        }
        if let Some(capture) = open_capture(self.sinks.nas.take(), pcap.nas_enable, &pcap.nas_filename, "NAS") {
            self.layers.nas.start_pcap(capture.clone());
            self.captures.push(capture);
        }
    }

    /// Body of the shutdown task.  Credential and session layers go first so
    /// they can flush outstanding procedures, then the transport layers, and
    /// the capture sinks are closed last.
    pub(crate) fn teardown(&mut self) {
        info!(target: targets::STACK, "stopping protocol layers");
        self.running = false;

        self.layers.usim.stop();
        self.layers.nas.stop();
        self.layers.rrc.stop();

        self.layers.rlc.stop();
        self.layers.pdcp.stop();
        self.layers.mac.stop();

        for capture in &self.captures {
            capture.close();
        }
    }

    /// Executor thread body: pop, run, repeat until the shutdown task runs.
    pub(crate) fn run(mut self) {
        info!(target: targets::STACK, "stack executor started");
        while self.running {
            let Some(task) = self.handle.dispatcher().pop_next() else {
                warn!(target: targets::STACK, "dispatcher closed under a running executor");
                break;
            };
            self.arm_deferred();
            // Layer state stays as the panicking task left it.
            if panic::catch_unwind(AssertUnwindSafe(|| task(&mut self))).is_err() {
                self.tasks_panicked += 1;
                error!(target: targets::STACK, "stack task panicked");
            }
            self.tasks_executed += 1;
        }
        info!(
            target: targets::STACK,
            tasks_executed = self.tasks_executed,
            tasks_panicked = self.tasks_panicked,
            ticks_processed = self.ticks_processed,
            "stack executor finished"
        );
    }
}

fn open_capture(
    sink: Option<Box<dyn CaptureSink>>,
    enabled: bool,
    path: &Path,
    layer: &'static str,
) -> Option<CaptureHandle> {
    if !enabled {
        return None;
    }
    let Some(mut sink) = sink else {
        warn!(target: targets::STACK, layer, "capture enabled but no sink supplied");
        return None;
    };
    match sink.open(path) {
        Ok(()) => {
            info!(target: targets::STACK, layer, path = %path.display(), "capture started");
            Some(CaptureHandle::new(layer, sink))
        }
        Err(e) => {
            warn!(
                target: targets::STACK,
                layer,
                path = %path.display(),
                "cannot open capture file: {e}"
            );
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
