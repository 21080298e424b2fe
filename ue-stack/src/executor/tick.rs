/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! TTI arithmetic and tick-duration profiling.
//!
//! These are kept apart from the executor so they can be used and tested
//! without a running stack.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::metrics::TickStats;
use crate::targets;

/// Tick ids wrap at 10240 (1024 radio frames × 10 subframes).
pub const TTI_WRAP: u32 = 10_240;

/// `tti - n` modulo [`TTI_WRAP`].
pub fn tti_sub(tti: u32, n: u32) -> u32 {
    let tti = tti % TTI_WRAP;
    let n = n % TTI_WRAP;
    (tti + TTI_WRAP - n) % TTI_WRAP
}

/// Sub-tick ids covered by a report of `tti` with `jump` elapsed ticks, in
/// processing order: `tti - (jump - 1), ..., tti - 1, tti`.
///
/// `jump == 0` yields nothing.
pub fn sub_ticks(tti: u32, jump: u32) -> impl Iterator<Item = u32> {
    (0..jump).map(move |i| tti_sub(tti, jump - i - 1))
}

// ── TickProfiler ──────────────────────────────────────────────────────────────

/// Measures tick batches and keeps running statistics.
///
/// Statistics cover the current stat period and are reset (after a `debug!`
/// summary) every `period` batches.  The count of late batches is kept for
/// the whole lifetime.
#[derive(Debug)]
pub struct TickProfiler {
    period: u32,
    threshold: Duration,
    started: Option<Instant>,
    batches: u64,
    total: Duration,
    max: Duration,
    late: u64,
}

impl TickProfiler {
    pub fn new(period: u32, threshold: Duration) -> Self {
        Self {
            period: period.max(1),
            threshold,
            started: None,
            batches: 0,
            total: Duration::ZERO,
            max: Duration::ZERO,
            late: 0,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Ends the measurement started by [`start`](Self::start) and returns
    /// its duration, or `None` if no measurement was running.
    pub fn stop(&mut self) -> Option<Duration> {
        let elapsed = self.started.take()?.elapsed();
        self.record(elapsed);
        Some(elapsed)
    }

    /// Adds one batch duration to the statistics.
    pub fn record(&mut self, elapsed: Duration) {
        self.batches += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
        if elapsed > self.threshold {
            self.late += 1;
        }

        if self.batches >= u64::from(self.period) {
            let stats = self.stats();
            debug!(
                target: targets::STACK,
                batches = stats.batches,
                mean_us = stats.mean_us,
                max_us = stats.max_us,
                late_batches = stats.late_batches,
                "tick processing statistics"
            );
            self.batches = 0;
            self.total = Duration::ZERO;
            self.max = Duration::ZERO;
        }
    }

    pub fn stats(&self) -> TickStats {
        let mean_us = if self.batches == 0 {
            0
        } else {
            (self.total.as_micros() / u128::from(self.batches)) as u64
        };
        TickStats {
            batches: self.batches,
            mean_us,
            max_us: self.max.as_micros() as u64,
            late_batches: self.late,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
