/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Metric snapshots returned by [`UeStack::query_metrics`](crate::UeStack::query_metrics).
//!
//! Layer metrics are produced by the layer implementations; the executor adds
//! its own section (queue occupancy, tick counters).  Every snapshot is taken
//! in a single task on the executor thread, so all sections describe the same
//! instant.

use serde::Serialize;

use crate::dispatcher::QueueDepth;

/// EPS mobility management state reported by NAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmmState {
    #[default]
    Deregistered,
    RegisteredInitiated,
    Registered,
    DeregisteredInitiated,
}

/// RRC connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RrcState {
    #[default]
    Idle,
    Connected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MacMetrics {
    pub tx_pkts: u64,
    pub tx_errors: u64,
    pub rx_pkts: u64,
    pub rx_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RlcMetrics {
    pub ul_bytes: u64,
    pub dl_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RrcMetrics {
    pub state: RrcState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NasMetrics {
    pub state: EmmState,
    pub nof_active_eps_bearer: u32,
}

/// Tick-processing durations accumulated by the profiler since the last
/// stat period rolled over.  All zero while `tick.time_stats` is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub batches: u64,
    pub mean_us: u64,
    pub max_us: u64,
    /// Batches that exceeded the warning threshold since start-up.
    pub late_batches: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorMetrics {
    /// Last tick id processed, `None` before the first tick.
    pub current_tti: Option<u32>,
    /// Sub-ticks processed since start-up.
    pub ticks_processed: u64,
    /// Tasks executed before the one producing this snapshot.
    pub tasks_executed: u64,
    /// Tasks that panicked; the executor kept serving after each.
    pub tasks_panicked: u64,
    /// Tick batches that ran past `tick.warn_threshold_ms` while profiling.
    pub long_tick_warnings: u64,
    /// Tick batches that ended with the sync queue above its watermark.
    pub sync_backlog_warnings: u64,
    /// Uplink SDUs dropped on a full gateway queue.
    pub uplink_dropped: u64,
    pub running_timers: usize,
    pub queues: Vec<QueueDepth>,
    pub tick_stats: TickStats,
}

/// One consistent snapshot of the whole stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StackMetrics {
    pub mac: MacMetrics,
    pub rlc: RlcMetrics,
    pub rrc: RrcMetrics,
    pub nas: NasMetrics,
    pub executor: ExecutorMetrics,
}

impl StackMetrics {
    /// `true` when NAS is registered and RRC is connected.
    pub fn is_attached(&self) -> bool {
        self.nas.state == EmmState::Registered && self.rrc.state == RrcState::Connected
    }
}
