/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the scheduling framework.
//!
//! Two error layers, same shape as the admission-control / top-level
//! split used elsewhere in this pipeline:
//!
//! * [`PidError`] — a single pid was invalid for the operation.
//! * [`SwitchError`] — `scheduler_switch` was asked for an unrecognised
//!   policy type.
//! * [`ValidationFinding`] — a structural inconsistency found by
//!   `validate()`. Never returned to the framework caller directly;
//!   logged and folded into a `bool`.

use thiserror::Error;

/// A pid was rejected by `setpriority` / `getpriority` / `nice`.
///
/// Per spec.md §7: out-of-range or `FREE` pids are errors for these
/// three calls; every other operation treats a bad pid as a no-op.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PidError {
    #[error("pid {0} is out of range [0, NPROC)")]
    OutOfRange(i32),

    #[error("pid {0} names a FREE process slot")]
    Free(i32),
}

/// `scheduler_switch` was asked for a policy type the framework does
/// not recognise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown scheduling policy: '{0}' (valid: round_robin, priority, mlfq, lottery, cfs, realtime)")]
pub struct SwitchError(pub String);

/// A single structural inconsistency found by a policy's `validate()`.
///
/// `validate()` returns `bool` to its caller (per spec.md §7, "the core
/// continues to run"), but every finding that produced `false` is
/// logged via `tracing::error!` with this detail attached.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationFinding {
    #[error("process {pid} is READY but absent from every ready structure (pool exhaustion or lost enqueue)")]
    OrphanedReadyProcess { pid: i32 },

    #[error("ready count {counted} does not match tracked count {tracked}")]
    CountMismatch { counted: usize, tracked: usize },

    #[error("free list + in-use nodes ({free} + {in_use}) != pool size {pool_size}")]
    PoolAccountingMismatch {
        free: usize,
        in_use: usize,
        pool_size: usize,
    },

    #[error("ready structure is not ordered as required: {detail}")]
    OrderingViolation { detail: String },

    #[error("linked structure is corrupt: {detail}")]
    LinkCorruption { detail: String },

    #[error("invariant violated: {detail}")]
    Other { detail: String },
}
