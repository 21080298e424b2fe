/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error types of the stack facade.
//!
//! * [`InitError`]: [`UeStack::init`](super::UeStack::init) failed; the
//!   executor was not started and the stack stays `Uninitialized` (or is
//!   left in whatever state made the call invalid).
//! * [`StackError`]: a synchronous query could not be answered.
//!
//! Fire-and-forget submissions never return these: they report `false` and
//! log instead, matching how callers on the radio and IP paths use them.

use std::io;

use thiserror::Error;

use super::LifecycleState;

// ── Initialisation ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum InitError {
    /// The configuration failed validation.
    #[error("invalid stack configuration: {0:#}")]
    Config(anyhow::Error),

    /// `init()` is only valid on an `Uninitialized` stack.
    #[error("stack cannot be initialised in state {0}")]
    InvalidState(LifecycleState),

    /// The credential store refused to come up.  No other layer was touched
    /// and no thread was started.
    #[error("USIM initialisation failed: {0:#}")]
    Usim(anyhow::Error),

    /// The OS refused to spawn one of the stack threads.
    #[error("failed to spawn thread '{thread}'")]
    Spawn {
        thread: &'static str,
        #[source]
        source: io::Error,
    },
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StackError {
    /// The stack is not `Running`; nothing would ever answer the query.
    #[error("stack is not running")]
    NotRunning,

    /// The query task was discarded before it ran (shutdown raced the query).
    #[error("query aborted: stack shut down before answering")]
    QueryAborted,
}
