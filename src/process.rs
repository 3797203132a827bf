/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! External collaborator contract (spec.md §1, §6).
//!
//! The process table, `context_switch`, the interrupt mask primitive,
//! and the binary semaphore are owned by the rest of the kernel, not by
//! this crate. What lives here is the *narrow contract* the framework
//! calls through, plus a minimal in-memory implementation of each used
//! only by this crate's own tests and the `schedsim` demo binary —
//! never by production callers, who supply their own.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::config::NPROC;

/// Pid type used throughout the framework. `-1` denotes "none" per
/// spec.md §3.
pub type Pid = i32;

/// Sentinel for "no process".
pub const NO_PID: Pid = -1;

/// Process state, as read (never written) by the scheduling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Running,
    Ready,
    Blocked,
    Sleeping,
    Suspended,
    Free,
}

/// The narrow read interface the scheduling core needs from the
/// process table: `priority` and `state` (spec.md §3: "The process
/// table is external; the core reads only `priority`, `state`").
pub trait ProcessTable: Send {
    fn priority(&self, pid: Pid) -> Option<i32>;
    fn state(&self, pid: Pid) -> Option<ProcessState>;
    fn set_state(&mut self, pid: Pid, state: ProcessState);
    fn set_priority(&mut self, pid: Pid, priority: i32);

    /// `true` iff `pid` is within `[0, NPROC)` and not `Free`.
    fn is_valid(&self, pid: Pid) -> bool {
        pid >= 0 && (pid as usize) < NPROC && self.state(pid) != Some(ProcessState::Free)
    }
}

/// Minimal in-memory process table used by this crate's tests and the
/// `schedsim` binary. Production callers implement [`ProcessTable`]
/// against their real table instead.
#[derive(Debug, Default)]
pub struct SimpleProcessTable {
    entries: HashMap<Pid, (i32, ProcessState)>,
}

impl SimpleProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pid: Pid, priority: i32, state: ProcessState) {
        self.entries.insert(pid, (priority, state));
    }
}

impl ProcessTable for SimpleProcessTable {
    fn priority(&self, pid: Pid) -> Option<i32> {
        self.entries.get(&pid).map(|(p, _)| *p)
    }

    fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.entries.get(&pid).map(|(_, s)| *s)
    }

    fn set_state(&mut self, pid: Pid, state: ProcessState) {
        self.entries
            .entry(pid)
            .and_modify(|(_, s)| *s = state)
            .or_insert((0, state));
    }

    fn set_priority(&mut self, pid: Pid, priority: i32) {
        self.entries
            .entry(pid)
            .and_modify(|(p, _)| *p = priority)
            .or_insert((priority, ProcessState::Ready));
    }
}

/// Low-level context switch primitive (spec.md §6: "saves the caller's
/// register context and restores `new_pid`'s; returns to the caller
/// when this process is scheduled again").
///
/// The default implementation only logs — it never actually suspends —
/// which is sufficient for driving the policies and the framework
/// under test. A production host provides a real one.
pub trait ContextSwitch: Send {
    fn switch(&mut self, old: Pid, new: Pid);
}

/// Logging-only stand-in for [`ContextSwitch`], used by tests and
/// `schedsim`. Counts switches so tests can assert on them (spec.md §8
/// scenario 1: "Context-switch count = 2").
#[derive(Debug, Default)]
pub struct LoggingContextSwitch {
    pub switch_count: u64,
}

impl ContextSwitch for LoggingContextSwitch {
    fn switch(&mut self, old: Pid, new: Pid) {
        self.switch_count += 1;
        debug!(from = old, to = new, count = self.switch_count, "context_switch");
    }
}

// ── Interrupt masking ───────────────────────────────────────────────────────

/// Scoped interrupt mask: acquired for the duration of a mutating
/// operation, guaranteed released (even on an early `return`) because
/// release happens in `Drop`.
///
/// There are no real interrupts to mask in a user-space crate; this
/// type exists so the framework's internal structure matches the
/// "scoped acquisition of interrupt mask with guaranteed restore on
/// every exit path" requirement of spec.md §5, and so a host kernel can
/// swap in a real mask/restore pair without touching call sites.
pub struct InterruptGuard {
    depth_before: u32,
    depth_cell: std::rc::Rc<std::cell::Cell<u32>>,
}

impl InterruptGuard {
    /// Acquire the mask, incrementing the nesting depth tracked by
    /// `depth_cell`. Takes an owned `Rc` clone rather than a borrow so
    /// the guard never holds a reference into whatever it was acquired
    /// from — it can outlive the `&self` call that created it without
    /// pinning that call site's borrow for the guard's whole scope.
    fn acquire(depth_cell: std::rc::Rc<std::cell::Cell<u32>>) -> Self {
        let depth_before = depth_cell.get();
        depth_cell.set(depth_before + 1);
        trace!(depth = depth_before + 1, "interrupts masked");
        InterruptGuard {
            depth_before,
            depth_cell,
        }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.depth_cell.set(self.depth_before);
        trace!(depth = self.depth_before, "interrupts restored");
    }
}

/// Owns the nesting-depth counter that [`InterruptGuard`] mutates.
#[derive(Default)]
pub struct InterruptMask {
    depth: std::rc::Rc<std::cell::Cell<u32>>,
}

impl InterruptMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask interrupts for the scope of the returned guard.
    pub fn scoped(&self) -> InterruptGuard {
        InterruptGuard::acquire(std::rc::Rc::clone(&self.depth))
    }

    /// Current nesting depth (0 = unmasked). Exposed for `validate()`.
    pub fn depth(&self) -> u32 {
        self.depth.get()
    }
}

// ── Binary semaphore ─────────────────────────────────────────────────────────

/// Minimal binary semaphore used to serialize cross-policy transitions
/// (spec.md §5: "Cross-policy transitions additionally hold a binary
/// semaphore"). Backed by a `Mutex<()>` since this crate's model has no
/// real concurrent threads of execution in the core — the type exists
/// to satisfy the contract and give a host kernel a single place to
/// substitute a real semaphore.
#[derive(Default)]
pub struct PolicySemaphore {
    inner: Mutex<()>,
}

impl PolicySemaphore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
