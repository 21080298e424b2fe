/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Stack configuration loading.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.  The expected YAML structure is:
//! ```yaml
//! stack:
//!   queue_capacity: 512
//!   background_workers: 2
//!   timer_capacity: 64
//! tick:
//!   time_stats: true
//!   warn_threshold_ms: 5
//!   sync_queue_warn_threshold: 5
//!   stat_period: 1000
//! detach:
//!   timeout_ms: 5000
//!   poll_interval_ms: 1
//! pcap:
//!   enable: false
//!   filename: "/tmp/ue_mac.pcap"
//!   nas_enable: false
//!   nas_filename: "/tmp/ue_nas.pcap"
//! log:
//!   stack_level: "info"
//!   mac_level: "warn"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::targets;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Capacity of every dispatcher queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Number of background worker threads.
pub const DEFAULT_BACKGROUND_WORKERS: usize = 2;

/// Initial slot count of the timer facility.
pub const DEFAULT_TIMER_CAPACITY: usize = 64;

/// Tick batches slower than this are reported as a potential deadline miss.
pub const DEFAULT_TICK_WARN_THRESHOLD_MS: u64 = 5;

/// Sync-queue backlog above which the executor is considered behind the
/// radio clock.
pub const DEFAULT_SYNC_QUEUE_WARN_THRESHOLD: usize = 5;

/// Number of tick batches summarised per profiler report.
pub const DEFAULT_TICK_STAT_PERIOD: u32 = 1000;

/// Upper bound on waiting for the switch-off detach to leave the UE
/// (TS 24.301 §5.5.2.2).
pub const DEFAULT_DETACH_TIMEOUT_MS: u64 = 5000;

/// Interval between two outstanding-data polls during graceful detach.
pub const DEFAULT_DETACH_POLL_INTERVAL_MS: u64 = 1;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StackConfigFile {
    stack: StackSection,
    tick: TickConfig,
    detach: DetachConfig,
    pcap: PcapConfig,
    log: LogConfig,
}

/// Dispatcher / pool sizing as it appears under `stack:`.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct StackSection {
    queue_capacity: usize,
    background_workers: usize,
    timer_capacity: usize,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            background_workers: DEFAULT_BACKGROUND_WORKERS,
            timer_capacity: DEFAULT_TIMER_CAPACITY,
        }
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// Tick-processing diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Measure every tick batch and warn when it exceeds `warn_threshold_ms`.
    pub time_stats: bool,
    pub warn_threshold_ms: u64,
    pub sync_queue_warn_threshold: usize,
    pub stat_period: u32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            time_stats: false,
            warn_threshold_ms: DEFAULT_TICK_WARN_THRESHOLD_MS,
            sync_queue_warn_threshold: DEFAULT_SYNC_QUEUE_WARN_THRESHOLD,
            stat_period: DEFAULT_TICK_STAT_PERIOD,
        }
    }
}

impl TickConfig {
    pub fn warn_threshold(&self) -> Duration {
        Duration::from_millis(self.warn_threshold_ms)
    }
}

/// Bounded wait used by the graceful (switch-off) detach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DetachConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for DetachConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_DETACH_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_DETACH_POLL_INTERVAL_MS,
        }
    }
}

impl DetachConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Diagnostic capture sinks opened during `init()`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PcapConfig {
    /// Open the MAC capture sink.
    pub enable: bool,
    pub filename: PathBuf,
    /// Open the NAS capture sink.
    pub nas_enable: bool,
    pub nas_filename: PathBuf,
}

impl Default for PcapConfig {
    fn default() -> Self {
        Self {
            enable: false,
            filename: PathBuf::from("/tmp/ue_mac.pcap"),
            nas_enable: false,
            nas_filename: PathBuf::from("/tmp/ue_nas.pcap"),
        }
    }
}

/// Per-layer log levels.
///
/// Values are `EnvFilter` level names (`error`, `warn`, `info`, `debug`,
/// `trace`, `off`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub stack_level: String,
    pub pool_level: String,
    pub mac_level: String,
    pub rlc_level: String,
    pub pdcp_level: String,
    pub rrc_level: String,
    pub nas_level: String,
    pub usim_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        let info = || String::from("info");
        Self {
            stack_level: info(),
            pool_level: String::from("warn"),
            mac_level: info(),
            rlc_level: info(),
            pdcp_level: info(),
            rrc_level: info(),
            nas_level: info(),
            usim_level: info(),
        }
    }
}

impl LogConfig {
    /// Builds an `EnvFilter` directive string, e.g.
    /// `ue_stack=info,stack=info,mac=warn,...`.
    ///
    /// Module-path targets inside this crate follow `stack_level`.
    pub fn filter_directives(&self) -> String {
        [
            ("ue_stack", &self.stack_level),
            (targets::STACK, &self.stack_level),
            (targets::POOL, &self.pool_level),
            (targets::MAC, &self.mac_level),
            (targets::RLC, &self.rlc_level),
            (targets::PDCP, &self.pdcp_level),
            (targets::RRC, &self.rrc_level),
            (targets::NAS, &self.nas_level),
            (targets::USIM, &self.usim_level),
        ]
        .iter()
        .map(|(target, level)| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Complete configuration of one UE stack instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Capacity of each dispatcher queue.
    pub queue_capacity: usize,
    pub background_workers: usize,
    pub timer_capacity: usize,
    pub tick: TickConfig,
    pub detach: DetachConfig,
    pub pcap: PcapConfig,
    pub log: LogConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfigFile::default().into()
    }
}

impl From<StackConfigFile> for StackConfig {
    fn from(file: StackConfigFile) -> Self {
        Self {
            queue_capacity: file.stack.queue_capacity,
            background_workers: file.stack.background_workers,
            timer_capacity: file.stack.timer_capacity,
            tick: file.tick,
            detach: file.detach,
            pcap: file.pcap,
            log: file.log,
        }
    }
}

impl StackConfig {
    /// Parses `path` and validates the result.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid, or if a value fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading stack configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))?;

        info!(
            queue_capacity = config.queue_capacity,
            background_workers = config.background_workers,
            tick_time_stats = config.tick.time_stats,
            detach_timeout_ms = config.detach.timeout_ms,
            "Stack configuration loaded"
        );
        Ok(config)
    }

    /// Parses a YAML document.  An empty document yields the defaults.
    ///
    /// # Errors
    /// Returns an error on malformed YAML, unknown sections, or invalid values.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: StackConfigFile = if content.trim().is_empty() {
            StackConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };
        let config = Self::from(file);
        config.validate()?;
        debug!(?config, "parsed stack configuration");
        Ok(config)
    }

    /// Rejects values the executor cannot run with.
    ///
    /// # Errors
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            bail!("stack.queue_capacity must be at least 1");
        }
        if self.background_workers == 0 {
            bail!("stack.background_workers must be at least 1");
        }
        if self.detach.poll_interval_ms == 0 {
            bail!("detach.poll_interval_ms must be at least 1");
        }
        if self.detach.poll_interval_ms > self.detach.timeout_ms {
            bail!(
                "detach.poll_interval_ms ({}) exceeds detach.timeout_ms ({})",
                self.detach.poll_interval_ms,
                self.detach.timeout_ms
            );
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
