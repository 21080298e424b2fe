/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! UE stack execution core
//!
//! Every mutation of protocol-layer state is expressed as a task and routed
//! through one dispatcher drained by one thread.  The layers themselves need
//! no locking: mutual exclusion is a structural property of "only the
//! executor thread ever dequeues".
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/       – YAML stack configuration
//! ├── dispatcher/   – bounded multi-queue, round-robin, single consumer
//! ├── executor/     – StackContext, run loop, TTI processing
//! │   └── tick      – TTI arithmetic and tick-duration profiler
//! ├── pool          – background worker pool for blocking radio calls
//! ├── bridge        – capacity-one result slot for synchronous queries
//! ├── timers        – per-TTI countdown timers
//! ├── layers        – boundary traits of the protocol layers / radio driver
//! ├── metrics       – metric snapshots returned by query_metrics()
//! ├── stack/        – UeStack lifecycle + StackHandle producer API
//! └── targets       – tracing targets used for per-layer log levels
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod layers;
pub mod metrics;
pub mod pool;
pub mod stack;
pub mod targets;
pub mod timers;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::StackConfig;
pub use executor::{StackContext, StackTask};
pub use stack::{InitError, LifecycleState, QueueKind, StackError, StackHandle, SyncEvent, UeStack};
