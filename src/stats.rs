/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Global and per-process accounting (spec.md §4.1, §5, §6).
//!
//! Counters are monotone non-decreasing and persist across policy
//! switches ("cumulative history is preserved", spec.md §7). Saturating
//! arithmetic stands in for the "no wraparound before 2^63" guarantee.

use std::collections::HashMap;

use crate::process::Pid;

/// Scheduler-wide counters, independent of which policy is active.
#[derive(Debug, Clone, Default)]
pub struct GlobalStats {
    pub context_switches: u64,
    pub ticks: u64,
    pub scheduler_invocations: u64,
    pub yields: u64,
    pub preemptions: u64,
    pub policy_switches: u64,
    pub pool_exhaustions: u64,
}

impl GlobalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_context_switch(&mut self) {
        self.context_switches = self.context_switches.saturating_add(1);
    }

    pub fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub fn record_schedule(&mut self) {
        self.scheduler_invocations = self.scheduler_invocations.saturating_add(1);
    }

    pub fn record_yield(&mut self) {
        self.yields = self.yields.saturating_add(1);
    }

    pub fn record_preemption(&mut self) {
        self.preemptions = self.preemptions.saturating_add(1);
    }

    pub fn record_policy_switch(&mut self) {
        self.policy_switches = self.policy_switches.saturating_add(1);
    }

    pub fn record_pool_exhaustion(&mut self) {
        self.pool_exhaustions = self.pool_exhaustions.saturating_add(1);
    }

    /// Resets every counter to zero. Per spec.md §6
    /// (`sched_reset_stats`), this clears only the global counters — it
    /// does not touch per-process stats or policy-internal state such
    /// as vruntime or tickets.
    pub fn reset(&mut self) {
        *self = GlobalStats::default();
    }
}

/// Per-process accounting, keyed by pid. Survives `scheduler_switch`
/// (spec.md §7: "counters and per-process stats persist across policy
/// switches").
#[derive(Debug, Clone, Default)]
pub struct ProcStats {
    pub ticks_run: u64,
    pub times_scheduled: u64,
    pub total_wait_ticks: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ProcStatsTable {
    by_pid: HashMap<Pid, ProcStats>,
}

impl ProcStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pid: Pid) -> ProcStats {
        self.by_pid.get(&pid).cloned().unwrap_or_default()
    }

    pub fn record_run_tick(&mut self, pid: Pid) {
        let entry = self.by_pid.entry(pid).or_default();
        entry.ticks_run = entry.ticks_run.saturating_add(1);
    }

    pub fn record_scheduled(&mut self, pid: Pid) {
        let entry = self.by_pid.entry(pid).or_default();
        entry.times_scheduled = entry.times_scheduled.saturating_add(1);
    }

    pub fn record_wait_tick(&mut self, pid: Pid) {
        let entry = self.by_pid.entry(pid).or_default();
        entry.total_wait_ticks = entry.total_wait_ticks.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.by_pid.clear();
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_stats_counters_saturate_instead_of_wrapping() {
        let mut stats = GlobalStats {
            ticks: u64::MAX,
            ..Default::default()
        };
        stats.record_tick();
        assert_eq!(stats.ticks, u64::MAX, "must saturate, not wrap");
    }

    #[test]
    fn reset_clears_every_counter() {
        let mut stats = GlobalStats::new();
        stats.record_tick();
        stats.record_context_switch();
        stats.reset();
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.context_switches, 0);
    }

    #[test]
    fn proc_stats_table_tracks_independent_pids() {
        let mut table = ProcStatsTable::new();
        table.record_run_tick(1);
        table.record_run_tick(1);
        table.record_scheduled(2);

        assert_eq!(table.get(1).ticks_run, 2);
        assert_eq!(table.get(2).times_scheduled, 1);
        assert_eq!(table.get(2).ticks_run, 0);
        assert_eq!(table.get(99), ProcStats::default());
    }
}
