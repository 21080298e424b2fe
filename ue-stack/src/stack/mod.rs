/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The UE stack facade and its lifecycle.
//!
//! [`UeStack`] owns the executor thread and wires every public operation to
//! a queue of the dispatcher:
//!
//! | Operation | Queue | Push |
//! |---|---|---|
//! | `start_radio_attach`, `enable_data` | ue | non-blocking |
//! | `stop_radio_attach`, `disable_data`, `query_metrics` | ue | blocking (query) |
//! | `advance_tick`, `notify_sync` | sync | blocking |
//! | `submit_uplink` | gw | per call |
//! | `report_background_result` | background | blocking |
//! | `shutdown` | control | blocking |
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──init()──► Running ──shutdown()──► Stopping ──► Stopped
//!       │                                                          ▲
//!       └─────────────────────shutdown()───────────────────────────┘
//! ```
//!
//! A failed `init()` leaves the stack `Uninitialized`.

mod error;
mod handle;

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::StackConfig;
use crate::executor::StackContext;
use crate::layers::{CaptureSinks, EstablishmentCause, RadioDriver, StackLayers, LCID_SRB1};
use crate::metrics::StackMetrics;
use crate::pool::WorkerId;
use crate::targets;

pub use error::{InitError, StackError};
pub use handle::{QueueKind, StackHandle};

/// Name of the executor thread.
pub const EXECUTOR_THREAD: &str = "STACK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        })
    }
}

/// Physical-layer synchronisation events forwarded to RRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    InSync,
    OutOfSync,
}

// ── UeStack ───────────────────────────────────────────────────────────────────

pub struct UeStack {
    handle: StackHandle,
    executor: Mutex<Option<JoinHandle<()>>>,
    /// Serialises `init` and `shutdown`.
    lifecycle: Mutex<()>,
}

impl fmt::Debug for UeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UeStack").field("handle", &self.handle).finish_non_exhaustive()
    }
}

impl UeStack {
    /// Creates an uninitialised stack: queues registered, workers started,
    /// no executor yet.
    ///
    /// # Errors
    /// [`InitError::Config`] for an invalid configuration,
    /// [`InitError::Spawn`] if a worker thread cannot be started.
    pub fn new(config: StackConfig) -> Result<Self, InitError> {
        Ok(Self {
            handle: StackHandle::new(config)?,
            executor: Mutex::new(None),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn handle(&self) -> &StackHandle {
        &self.handle
    }

    pub fn stack_type(&self) -> &'static str {
        "lte"
    }

    pub fn state(&self) -> LifecycleState {
        self.handle.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Initialises the layers and starts the executor thread.
    ///
    /// USIM comes first and a failure there aborts before any other layer is
    /// touched.  Then MAC, RLC, PDCP, NAS and RRC are initialised in that
    /// order, the enabled capture sinks are opened, and the `STACK` thread is
    /// spawned.
    ///
    /// # Errors
    /// [`InitError::InvalidState`] unless the stack is `Uninitialized`;
    /// [`InitError::Usim`]; [`InitError::Spawn`].
    pub fn init(
        &self,
        mut layers: StackLayers,
        radio: Arc<dyn RadioDriver>,
        captures: CaptureSinks,
    ) -> Result<(), InitError> {
        let _guard = self.lifecycle.lock();
        let state = self.state();
        if state != LifecycleState::Uninitialized {
            return Err(InitError::InvalidState(state));
        }

        if let Err(e) = layers.usim.init() {
            error!(target: targets::USIM, "failed to initialise USIM: {e:#}");
            return Err(InitError::Usim(e));
        }
        layers.mac.init();
        layers.rlc.init();
        layers.pdcp.init();
        layers.nas.init(self.handle.clone());
        layers.rrc.init(self.handle.clone());
        self.handle.set_radio(radio);

        let mut ctx = StackContext::new(layers, captures, self.handle.clone());
        ctx.open_captures(&self.handle.config().pcap);

        // Running before the thread exists, so early queries simply wait.
        self.handle.set_state(LifecycleState::Running);
        let spawned = thread::Builder::new()
            .name(EXECUTOR_THREAD.to_string())
            .spawn(move || ctx.run());
        match spawned {
            Ok(join) => {
                *self.executor.lock() = Some(join);
                info!(target: targets::STACK, stack_type = self.stack_type(), "stack initialised");
                Ok(())
            }
            Err(source) => {
                // The layers went down with the context; nothing can restart them.
                self.handle.set_state(LifecycleState::Stopped);
                self.handle.dispatcher().close();
                Err(InitError::Spawn {
                    thread: EXECUTOR_THREAD,
                    source,
                })
            }
        }
    }

    // ── Attach / detach ───────────────────────────────────────────────────────

    /// Asks NAS to attach.  Returns `false` if the request could not be
    /// queued.
    pub fn start_radio_attach(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        let pushed = self.handle.try_enqueue(QueueKind::Ue, |ctx: &mut StackContext| {
            ctx.layers.nas.start_attach(EstablishmentCause::MoSignalling);
        });
        match pushed {
            Ok(()) => true,
            Err(e) => {
                warn!(target: targets::NAS, "attach request not queued: {e}");
                false
            }
        }
    }

    /// Detaches from the network.
    ///
    /// Graceful: sends a switch-off detach and waits until SRB1 has drained
    /// or `detach.timeout_ms` elapses; `false` means the detach may not
    /// have reached the network.  Non-graceful: returns NAS's answer to a
    /// plain detach request.
    pub fn stop_radio_attach(&self, graceful: bool) -> bool {
        if !graceful {
            return self.query_or_warn(|ctx| ctx.layers.nas.detach_request(false));
        }

        if !self.query_or_warn(|ctx| ctx.layers.nas.detach_request(true)) {
            debug!(target: targets::NAS, "no switch-off detach generated");
        }

        let detach = &self.handle.config().detach;
        let deadline = Instant::now() + detach.timeout();
        loop {
            let pending = match self.handle.query(|ctx| ctx.layers.rlc.has_data(LCID_SRB1)) {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(target: targets::NAS, "cannot poll SRB1: {e}");
                    return false;
                }
            };
            if !pending {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    target: targets::NAS,
                    timeout_ms = detach.timeout_ms,
                    "detach couldn't be sent before the deadline"
                );
                return false;
            }
            thread::sleep(detach.poll_interval().min(deadline - now));
        }
    }

    /// Leaves airplane mode: starts an attach.
    pub fn enable_data(&self) -> bool {
        info!(target: targets::STACK, "Turning off airplane mode");
        self.start_radio_attach()
    }

    /// Enters airplane mode: non-graceful detach.
    pub fn disable_data(&self) -> bool {
        info!(target: targets::STACK, "Turning on airplane mode");
        self.stop_radio_attach(false)
    }

    fn query_or_warn<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut StackContext) -> bool + Send + 'static,
    {
        self.handle.query(f).unwrap_or_else(|e| {
            warn!(target: targets::NAS, "detach request failed: {e}");
            false
        })
    }

    // ── Data and timing paths ─────────────────────────────────────────────────

    /// Forwards an uplink SDU to PDCP.
    ///
    /// With `blocking == false` a full gateway queue drops the SDU and
    /// returns `false`; with `blocking == true` the caller waits for room.
    pub fn submit_uplink(&self, lcid: u32, sdu: Vec<u8>, blocking: bool) -> bool {
        let task = move |ctx: &mut StackContext| ctx.layers.pdcp.write_sdu(lcid, sdu, blocking);
        let pushed = if blocking {
            self.handle.enqueue_blocking(QueueKind::Gateway, task)
        } else {
            self.handle.try_enqueue(QueueKind::Gateway, task)
        };
        match pushed {
            Ok(()) => true,
            Err(e) if e.is_full() => {
                self.handle.record_uplink_drop();
                warn!(target: targets::PDCP, lcid, "gateway queue full, SDU discarded");
                false
            }
            Err(e) => {
                debug!(target: targets::PDCP, lcid, "SDU discarded: {e}");
                false
            }
        }
    }

    /// Forwards a synchronisation event to RRC.  Blocks while the sync queue
    /// is full.
    pub fn notify_sync(&self, event: SyncEvent) {
        let pushed = self.handle.enqueue_blocking(QueueKind::Sync, move |ctx: &mut StackContext| {
            match event {
                SyncEvent::InSync => ctx.layers.rrc.in_sync(),
                SyncEvent::OutOfSync => ctx.layers.rrc.out_of_sync(),
            }
        });
        if let Err(e) = pushed {
            debug!(target: targets::RRC, ?event, "sync event dropped: {e}");
        }
    }

    /// Reports that the radio clock reached `tti` after `ticks_elapsed`
    /// ticks.  Blocks while the sync queue is full.
    pub fn advance_tick(&self, tti: u32, ticks_elapsed: u32) {
        let pushed = self.handle.enqueue_blocking(QueueKind::Sync, move |ctx: &mut StackContext| {
            ctx.run_tti(tti, ticks_elapsed);
        });
        if let Err(e) = pushed {
            debug!(target: targets::STACK, tti, "tick dropped: {e}");
        }
    }

    /// One consistent snapshot of every layer and the executor.
    ///
    /// # Errors
    /// See [`StackHandle::query`].
    pub fn query_metrics(&self) -> Result<StackMetrics, StackError> {
        self.handle.query(|ctx| ctx.metrics())
    }

    pub fn submit_background<F>(&self, task: F) -> bool
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        self.handle.submit_background(task)
    }

    pub fn report_background_result<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut StackContext) + Send + 'static,
    {
        self.handle.report_background_result(task)
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Stops the layers, the executor and the worker pool.
    ///
    /// Idempotent; concurrent callers wait for the first one to finish.
    /// Must not be called from the executor thread or a background worker.
    pub fn shutdown(&self) {
        let _guard = self.lifecycle.lock();
        match self.state() {
            LifecycleState::Stopped => return,
            LifecycleState::Uninitialized => {
                self.handle.dispatcher().close();
                self.handle.pool().stop();
                self.handle.set_state(LifecycleState::Stopped);
                return;
            }
            LifecycleState::Running | LifecycleState::Stopping => {}
        }

        info!(target: targets::STACK, "stopping stack");
        self.handle.set_state(LifecycleState::Stopping);

        let pushed = self
            .handle
            .enqueue_blocking(QueueKind::Control, |ctx: &mut StackContext| ctx.teardown());
        if let Err(e) = pushed {
            error!(target: targets::STACK, "cannot queue shutdown task: {e}");
        }

        if let Some(join) = self.executor.lock().take() {
            if join.join().is_err() {
                error!(target: targets::STACK, "stack executor terminated abnormally");
            }
        }

        let discarded = self.handle.dispatcher().close();
        if discarded > 0 {
            debug!(target: targets::STACK, discarded, "pending tasks discarded");
        }
        self.handle.pool().stop();
        self.handle.set_state(LifecycleState::Stopped);
        info!(target: targets::STACK, "stack stopped");
    }
}

impl Drop for UeStack {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        mock_captures, mock_layers, test_config, Call, MockControls, MockOptions, MockRadio,
        Recorder,
    };
    use crate::layers::CellSearchResult;
    use crate::metrics::RrcState;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn running_stack(config: StackConfig, opts: MockOptions) -> (UeStack, Recorder, MockControls) {
        let rec = Recorder::default();
        let (layers, controls) = mock_layers(&rec, &opts);
        let stack = UeStack::new(config).unwrap();
        stack
            .init(layers, Arc::new(MockRadio::default()), mock_captures(&rec, &opts))
            .unwrap();
        (stack, rec, controls)
    }

    fn wait_for(rec: &Recorder, pred: impl Fn(&Call) -> bool + Copy) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while rec.count(pred) == 0 {
            assert!(Instant::now() < deadline, "timed out waiting for call");
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Queries are round-robin with the other queues, so a query may
    /// overtake ticks already queued on the sync queue.
    fn metrics_until(stack: &UeStack, pred: impl Fn(&StackMetrics) -> bool) -> StackMetrics {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let m = stack.query_metrics().unwrap();
            if pred(&m) {
                return m;
            }
            assert!(Instant::now() < deadline, "condition never held: {m:?}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn init_runs_layers_in_order() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        assert_eq!(stack.state(), LifecycleState::Running);
        assert_eq!(stack.stack_type(), "lte");
        assert_eq!(
            rec.calls(),
            vec![
                Call::UsimInit,
                Call::MacInit,
                Call::RlcInit,
                Call::PdcpInit,
                Call::NasInit,
                Call::RrcInit,
            ]
        );
    }

    #[test]
    fn usim_failure_aborts_before_other_layers() {
        let rec = Recorder::default();
        let opts = MockOptions {
            usim_fails: true,
            ..Default::default()
        };
        let (layers, _) = mock_layers(&rec, &opts);
        let stack = UeStack::new(test_config()).unwrap();
        let err = stack
            .init(layers, Arc::new(MockRadio::default()), mock_captures(&rec, &opts))
            .unwrap_err();

        assert!(matches!(err, InitError::Usim(_)));
        assert_eq!(rec.calls(), vec![Call::UsimInit]);
        assert_eq!(stack.state(), LifecycleState::Uninitialized);
        assert!(stack.executor.lock().is_none());
        assert_eq!(stack.query_metrics().unwrap_err(), StackError::NotRunning);
    }

    #[test]
    fn second_init_is_invalid() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        let (layers, _) = mock_layers(&rec, &MockOptions::default());
        let err = stack
            .init(layers, Arc::new(MockRadio::default()), CaptureSinks::default())
            .unwrap_err();
        assert!(matches!(err, InitError::InvalidState(LifecycleState::Running)));
    }

    #[test]
    fn enabled_captures_open_at_init() {
        let mut config = test_config();
        config.pcap.enable = true;
        let (stack, rec, _) = running_stack(config, MockOptions::default());
        assert_eq!(rec.count(|c| *c == Call::CaptureOpen("mac")), 1);
        assert_eq!(rec.count(|c| *c == Call::CaptureOpen("nas")), 0);
        stack.shutdown();
        assert_eq!(rec.count(|c| *c == Call::CaptureClose("mac")), 1);
        assert_eq!(rec.count(|c| *c == Call::CaptureClose("nas")), 0);
    }

    #[test]
    fn tasks_from_many_threads_run_exclusively_on_executor() {
        let (stack, _, controls) = running_stack(test_config(), MockOptions::default());
        let stack = Arc::new(stack);

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for i in 0..50 {
                        stack.advance_tick(p * 100 + i, 1);
                        stack.submit_uplink(3, vec![0; 8], true);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        metrics_until(&stack, |m| m.executor.ticks_processed == 200);
        assert_eq!(controls.max_in_flight(), 1);
        let threads = controls.threads();
        assert_eq!(threads.len(), 1);
        assert!(threads.contains(EXECUTOR_THREAD));
    }

    #[test]
    fn concurrent_metric_queries_are_consistent() {
        let (stack, _, _) = running_stack(test_config(), MockOptions::default());
        let stack = Arc::new(stack);

        let ticker = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || {
                for tti in 0..300 {
                    stack.advance_tick(tti, 1 + tti % 3);
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let m = stack.query_metrics().unwrap();
                        assert_eq!(m.mac.tx_pkts, m.executor.ticks_processed);
                    }
                })
            })
            .collect();

        ticker.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }

    #[test]
    fn attach_and_sync_update_attached_state() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        assert!(stack.enable_data());
        stack.notify_sync(SyncEvent::InSync);
        metrics_until(&stack, StackMetrics::is_attached);
        assert_eq!(rec.count(|c| *c == Call::NasAttach), 1);

        assert!(stack.disable_data());
        assert_eq!(rec.count(|c| *c == Call::NasDetach { switch_off: false }), 1);
        assert!(!stack.query_metrics().unwrap().is_attached());
    }

    #[test]
    fn graceful_detach_returns_once_srb1_drains() {
        let (stack, rec, controls) = running_stack(test_config(), MockOptions::default());
        controls.srb1_pending.store(true, Ordering::SeqCst);
        let pending = Arc::clone(&controls.srb1_pending);
        let drain = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            pending.store(false, Ordering::SeqCst);
        });

        assert!(stack.stop_radio_attach(true));
        assert_eq!(rec.count(|c| *c == Call::NasDetach { switch_off: true }), 1);
        drain.join().unwrap();
    }

    #[test]
    fn graceful_detach_gives_up_at_deadline() {
        let config = test_config();
        let timeout = config.detach.timeout();
        let (stack, _, controls) = running_stack(config, MockOptions::default());
        controls.srb1_pending.store(true, Ordering::SeqCst);

        let started = Instant::now();
        assert!(!stack.stop_radio_attach(true));
        let elapsed = started.elapsed();
        assert!(elapsed >= timeout, "returned after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_millis(500), "returned after {elapsed:?}");
    }

    #[test]
    fn non_blocking_uplink_is_dropped_when_queue_full() {
        let mut config = test_config();
        config.queue_capacity = 2;
        let (stack, rec, _) = running_stack(config, MockOptions::default());

        // Park the executor so the gateway queue cannot drain.
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (parked_tx, parked_rx) = crossbeam_channel::bounded::<()>(0);
        stack
            .handle()
            .try_enqueue(QueueKind::Ue, move |_| {
                parked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        parked_rx.recv().unwrap();

        assert!(stack.submit_uplink(3, vec![1], false));
        assert!(stack.submit_uplink(3, vec![2], false));
        assert_eq!(stack.handle().uplink_dropped(), 0);
        assert!(!stack.submit_uplink(3, vec![3], false));
        assert_eq!(stack.handle().queue_depth(QueueKind::Gateway), 2);

        release_tx.send(()).unwrap();
        wait_for(&rec, |c| *c == Call::PdcpSdu { lcid: 3, len: 1 });
        let m = metrics_until(&stack, |m| m.executor.queues[QueueKind::Gateway as usize].depth == 0);
        assert_eq!(rec.count(|c| matches!(c, Call::PdcpSdu { lcid: 3, .. })), 2);
        assert_eq!(m.executor.uplink_dropped, 1);
    }

    #[test]
    fn cell_search_and_select_report_back_to_rrc() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        assert!(stack.handle().start_cell_search());
        wait_for(&rec, |c| *c == Call::RrcCellSearch(CellSearchResult::CellFound));

        assert!(stack.handle().start_cell_select(MockRadio::default().cell));
        wait_for(&rec, |c| *c == Call::RrcCellSelect(true));
        metrics_until(&stack, |m| m.rrc.state == RrcState::Connected);
    }

    #[test]
    fn deferred_callback_fires_after_ticks() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        assert!(stack.handle().defer_callback(2, |layers| layers.rrc.out_of_sync()));
        // Deferrals are armed before the next task runs.
        let m = stack.query_metrics().unwrap();
        assert_eq!(m.executor.running_timers, 1);

        stack.advance_tick(1, 1);
        metrics_until(&stack, |m| m.executor.ticks_processed == 1);
        assert_eq!(rec.count(|c| *c == Call::RrcOutOfSync), 0);
        stack.advance_tick(2, 1);
        metrics_until(&stack, |m| m.executor.ticks_processed == 2);
        assert_eq!(rec.count(|c| *c == Call::RrcOutOfSync), 1);
    }

    #[test]
    fn deferral_from_a_sync_task_is_not_held_behind_the_ue_queue() {
        let (stack, _, _) = running_stack(test_config(), MockOptions::default());
        let (fired_tx, fired_rx) = crossbeam_channel::unbounded();

        // Park the executor so everything below is queued before it runs.
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let (parked_tx, parked_rx) = crossbeam_channel::bounded::<()>(0);
        assert!(stack.report_background_result(move |_| {
            parked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }));
        parked_rx.recv().unwrap();

        stack.handle().try_enqueue(QueueKind::Ue, |_| {}).unwrap();
        stack
            .handle()
            .enqueue_blocking(QueueKind::Sync, move |ctx: &mut StackContext| {
                ctx.handle().defer_callback(1, move |layers| {
                    fired_tx.send(layers.mac.metrics().tx_pkts).unwrap();
                });
            })
            .unwrap();
        for tti in 1..=4 {
            stack.advance_tick(tti, 1);
        }

        release_tx.send(()).unwrap();
        metrics_until(&stack, |m| m.executor.ticks_processed == 4);
        assert_eq!(fired_rx.try_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn panicking_task_does_not_stop_the_executor() {
        let (stack, _, _) = running_stack(test_config(), MockOptions::default());
        assert!(stack.report_background_result(|_| panic!("layer bug")));
        metrics_until(&stack, |m| m.executor.tasks_panicked == 1);
        assert_eq!(stack.state(), LifecycleState::Running);

        let err = stack.handle().query(|_| -> u32 { panic!("query bug") }).unwrap_err();
        assert_eq!(err, StackError::QueryAborted);

        stack.advance_tick(1, 1);
        let m = metrics_until(&stack, |m| m.executor.ticks_processed == 1);
        assert_eq!(m.executor.tasks_panicked, 2);

        stack.shutdown();
        assert_eq!(stack.state(), LifecycleState::Stopped);
    }

    #[test]
    fn shutdown_tears_down_in_order_and_is_idempotent() {
        let mut config = test_config();
        config.pcap.enable = true;
        config.pcap.nas_enable = true;
        let (stack, rec, _) = running_stack(config, MockOptions::default());
        rec.clear();

        stack.shutdown();
        assert_eq!(stack.state(), LifecycleState::Stopped);
        assert_eq!(
            rec.calls(),
            vec![
                Call::UsimStop,
                Call::NasStop,
                Call::RrcStop,
                Call::RlcStop,
                Call::PdcpStop,
                Call::MacStop,
                Call::CaptureClose("mac"),
                Call::CaptureClose("nas"),
            ]
        );

        let started = Instant::now();
        stack.shutdown();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(rec.calls().len(), 8);
    }

    #[test]
    fn concurrent_shutdown_runs_teardown_once() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        let stack = Arc::new(stack);
        let callers: Vec<_> = (0..4)
            .map(|_| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || stack.shutdown())
            })
            .collect();
        for c in callers {
            c.join().unwrap();
        }
        assert_eq!(rec.count(|c| *c == Call::MacStop), 1);
        assert_eq!(stack.state(), LifecycleState::Stopped);
    }

    #[test]
    fn operations_after_shutdown_are_refused() {
        let (stack, rec, _) = running_stack(test_config(), MockOptions::default());
        stack.shutdown();

        assert_eq!(stack.query_metrics().unwrap_err(), StackError::NotRunning);
        assert!(!stack.start_radio_attach());
        assert!(!stack.stop_radio_attach(false));
        assert!(!stack.submit_uplink(3, vec![0], false));
        assert!(!stack.submit_background(|_| {}));
        stack.advance_tick(1, 1);
        assert_eq!(rec.mac_ttis().len(), 0);

        let (layers, _) = mock_layers(&rec, &MockOptions::default());
        let err = stack
            .init(layers, Arc::new(MockRadio::default()), CaptureSinks::default())
            .unwrap_err();
        assert!(matches!(err, InitError::InvalidState(LifecycleState::Stopped)));
    }

    #[test]
    fn shutdown_before_init_stops_workers() {
        let stack = UeStack::new(test_config()).unwrap();
        stack.shutdown();
        assert_eq!(stack.state(), LifecycleState::Stopped);
        assert!(!stack.submit_background(|_| {}));
    }
}
