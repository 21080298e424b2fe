/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! `tracing` targets for per-layer log filtering.
//!
//! The log section of the configuration maps one level onto each of these
//! (see [`LogConfig::filter_directives`](crate::config::LogConfig::filter_directives)).
//! Layer implementations outside this crate should log with the same targets
//! so a single `EnvFilter` controls the whole stack.

pub const STACK: &str = "stack";
pub const POOL: &str = "pool";
pub const MAC: &str = "mac";
pub const RLC: &str = "rlc";
pub const PDCP: &str = "pdcp";
pub const RRC: &str = "rrc";
pub const NAS: &str = "nas";
pub const USIM: &str = "usim";
