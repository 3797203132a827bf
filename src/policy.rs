/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The policy vtable (spec.md §4.1) and the closed set of policy kinds.
//!
//! Rust has no open class hierarchy, so "any entry may be absent" is
//! modeled with default trait methods: a policy that does not support a
//! capability simply keeps the default, which reports "not handled"
//! (`false`/`None`) rather than panicking. [`crate::framework`] checks
//! these return values and falls back to generic behaviour exactly as
//! spec.md §4.1 describes.

use std::collections::HashMap;

use crate::error::ValidationFinding;
use crate::process::Pid;

/// The closed set of scheduling policies this crate implements. Closed
/// at build time, per spec.md §9 ("the set of policies is closed at
/// build time").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyType {
    RoundRobin,
    Priority,
    Mlfq,
    Lottery,
    Cfs,
    RealTime,
}

impl PolicyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyType::RoundRobin => "round_robin",
            PolicyType::Priority => "priority",
            PolicyType::Mlfq => "mlfq",
            PolicyType::Lottery => "lottery",
            PolicyType::Cfs => "cfs",
            PolicyType::RealTime => "realtime",
        }
    }

    /// Parses a policy type from its wire/CLI name. Used by
    /// `scheduler_switch`/`scheduler_init` (spec.md §6, §7: "Unknown
    /// policy type ... returns error").
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "round_robin" | "rr" => Some(PolicyType::RoundRobin),
            "priority" | "prio" => Some(PolicyType::Priority),
            "mlfq" => Some(PolicyType::Mlfq),
            "lottery" => Some(PolicyType::Lottery),
            "cfs" => Some(PolicyType::Cfs),
            "realtime" | "rt" => Some(PolicyType::RealTime),
            _ => None,
        }
    }
}

/// Outcome of [`Policy::schedule`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleDecision {
    /// The pid that should now be RUNNING, or `NO_PID` if nothing is
    /// runnable.
    pub next: Pid,
    /// `true` if `next` differs from the previously running process,
    /// i.e. a `context_switch` is required.
    pub switched: bool,
}

/// A capability record a policy fills in; the framework calls through
/// it (spec.md §4.1).
///
/// Every method has a default "not handled" implementation so a
/// concrete policy only needs to override what it actually supports.
pub trait Policy: Send {
    fn name(&self) -> &'static str;
    fn policy_type(&self) -> PolicyType;

    fn init(&mut self) {}
    fn shutdown(&mut self) {}

    /// Choose the next process to run and update internal bookkeeping.
    /// Does **not** perform the `RUNNING`/`READY` transition or the
    /// context switch itself — that is the framework's job once it has
    /// the decision.
    fn schedule(&mut self) -> ScheduleDecision {
        ScheduleDecision {
            next: self.pick_next(),
            switched: false,
        }
    }

    /// Peek at who would run next without mutating state.
    fn pick_next(&self) -> Pid {
        crate::process::NO_PID
    }

    /// Voluntary yield by the running process. Returns `true` if a
    /// resched is now needed.
    fn yield_now(&mut self) -> bool {
        false
    }

    /// External preemption request (e.g. a higher-priority process just
    /// became ready). Returns `true` if a resched is now needed.
    fn preempt(&mut self) -> bool {
        false
    }

    /// `true` if handled. `false` tells the framework to fall back to
    /// its generic FIFO ready queue.
    ///
    /// `priority` is the process's current priority as read from the
    /// process table (spec.md §3: "the core reads only `priority`,
    /// `state`") — policies that key off priority (PRIO, MLFQ's entry
    /// band) use it to seed their node; policies that don't (RR,
    /// lottery, CFS, RT) ignore it.
    fn enqueue(&mut self, pid: Pid, priority: i32) -> bool {
        let _ = (pid, priority);
        false
    }

    /// `true` if handled (including "was not present", which is a
    /// no-op per spec.md §3). `false` tells the framework to try its
    /// generic fallback queue.
    fn dequeue(&mut self, pid: Pid) -> bool {
        let _ = pid;
        false
    }

    /// `None` if this policy does not model per-process priority.
    /// `Some(need_resched)` if handled.
    fn set_priority(&mut self, pid: Pid, priority: i32) -> Option<bool> {
        let _ = (pid, priority);
        None
    }

    fn get_priority(&self, pid: Pid) -> Option<i32> {
        let _ = pid;
        None
    }

    fn boost_priority(&mut self, pid: Pid) {
        let _ = pid;
    }

    fn decay_priority(&mut self, pid: Pid) {
        let _ = pid;
    }

    /// `true` if this policy has a settable quantum.
    fn set_quantum(&mut self, quantum: u32) -> bool {
        let _ = quantum;
        false
    }

    fn get_quantum(&self) -> Option<u32> {
        None
    }

    /// Advance one tick. Returns `true` if a resched is now needed.
    fn tick(&mut self) -> bool {
        false
    }

    fn get_stats(&self) -> PolicyStats {
        PolicyStats::default()
    }

    fn reset_stats(&mut self) {}

    /// Human-readable stats dump; the framework logs it via `tracing`.
    fn print_stats(&self) -> String {
        format!("{}: no stats available", self.name())
    }

    /// Structural invariant checks (spec.md §8). Empty = no findings.
    fn validate(&self) -> Vec<ValidationFinding> {
        Vec::new()
    }

    /// Human-readable structure dump for `sched_dump`.
    fn dump(&self) -> String {
        format!("{}: (no dump implemented)", self.name())
    }
}

/// Generic, policy-agnostic statistics snapshot returned by
/// `sched_get_stats` (spec.md §6). Policy-specific metrics (Jain's
/// index, total tickets, min_vruntime, ...) go in `extra`.
#[derive(Debug, Clone, Default)]
pub struct PolicyStats {
    pub ready_count: usize,
    pub schedule_calls: u64,
    pub extra: HashMap<String, f64>,
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_type_parse_round_trips_canonical_names() {
        for pt in [
            PolicyType::RoundRobin,
            PolicyType::Priority,
            PolicyType::Mlfq,
            PolicyType::Lottery,
            PolicyType::Cfs,
            PolicyType::RealTime,
        ] {
            assert_eq!(PolicyType::parse(pt.as_str()), Some(pt));
        }
    }

    #[test]
    fn policy_type_parse_rejects_unknown_names() {
        assert_eq!(PolicyType::parse("round_robin_nonsense"), None);
    }

    struct NullPolicy;
    impl Policy for NullPolicy {
        fn name(&self) -> &'static str {
            "null"
        }
        fn policy_type(&self) -> PolicyType {
            PolicyType::RoundRobin
        }
    }

    #[test]
    fn default_trait_methods_report_not_handled() {
        let mut p = NullPolicy;
        assert!(!p.enqueue(1, 0));
        assert!(!p.dequeue(1));
        assert_eq!(p.set_priority(1, 5), None);
        assert_eq!(p.get_priority(1), None);
        assert!(!p.set_quantum(5));
        assert_eq!(p.get_quantum(), None);
        assert!(!p.tick());
        assert!(!p.yield_now());
        assert!(!p.preempt());
        assert!(p.validate().is_empty());
    }
}
