/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The scheduling core (spec.md §6): the single entry point a host
//! kernel calls through, wiring the active [`Policy`] to the process
//! table, the context-switch primitive, and the generic fallback ready
//! queue used when a policy doesn't implement `enqueue`/`dequeue`
//! itself.

use std::collections::VecDeque;

use tracing::error;

use crate::config::{clamp, NPROC, PRIORITY_MAX, PRIORITY_MIN};
use crate::error::{PidError, SwitchError};
use crate::policies::cfs::Cfs;
use crate::policies::lottery::Lottery;
use crate::policies::mlfq::Mlfq;
use crate::policies::priority::Priority;
use crate::policies::realtime::{RealTime, RtAlgorithm};
use crate::policies::round_robin::RoundRobin;
use crate::policy::{Policy, PolicyType};
use crate::process::{ContextSwitch, InterruptMask, Pid, PolicySemaphore, ProcessState, ProcessTable, NO_PID};
use crate::stats::{GlobalStats, ProcStats, ProcStatsTable};

fn make_policy(policy_type: PolicyType, capacity: usize) -> Box<dyn Policy> {
    match policy_type {
        PolicyType::RoundRobin => Box::new(RoundRobin::new(capacity)),
        PolicyType::Priority => Box::new(Priority::new(capacity)),
        PolicyType::Mlfq => Box::new(Mlfq::new(capacity)),
        PolicyType::Lottery => Box::new(Lottery::new(capacity)),
        PolicyType::Cfs => Box::new(Cfs::new(capacity)),
        PolicyType::RealTime => Box::new(RealTime::new(capacity, RtAlgorithm::Edf)),
    }
}

/// The scheduling core. Owns the active policy and the bookkeeping
/// that's independent of which one is installed: global/per-process
/// stats, the system tick counter, the interrupt mask and
/// cross-policy-transition semaphore, and a plain FIFO used as a
/// fallback ready queue for any policy whose `enqueue`/`dequeue`
/// return `false` (spec.md §4.1).
pub struct SchedulerFramework {
    active: Box<dyn Policy>,
    policy_type: PolicyType,
    capacity: usize,
    process_table: Box<dyn ProcessTable>,
    context_switch: Box<dyn ContextSwitch>,
    stats: GlobalStats,
    proc_stats: ProcStatsTable,
    need_resched: bool,
    running: Pid,
    system_ticks: u64,
    interrupt_mask: InterruptMask,
    semaphore: PolicySemaphore,
    fallback_ready: VecDeque<Pid>,
}

impl SchedulerFramework {
    pub fn new(
        policy_type: PolicyType,
        capacity: usize,
        process_table: Box<dyn ProcessTable>,
        context_switch: Box<dyn ContextSwitch>,
    ) -> Self {
        SchedulerFramework {
            active: make_policy(policy_type, capacity),
            policy_type,
            capacity,
            process_table,
            context_switch,
            stats: GlobalStats::new(),
            proc_stats: ProcStatsTable::new(),
            need_resched: false,
            running: NO_PID,
            system_ticks: 0,
            interrupt_mask: InterruptMask::new(),
            semaphore: PolicySemaphore::new(),
            fallback_ready: VecDeque::new(),
        }
    }

    /// Construct with the real-time policy installed under a specific
    /// algorithm — [`PolicyType::RealTime`] alone doesn't say which of
    /// EDF/RMS/DMS/LLF to run.
    pub fn with_realtime_algorithm(
        algorithm: RtAlgorithm,
        capacity: usize,
        process_table: Box<dyn ProcessTable>,
        context_switch: Box<dyn ContextSwitch>,
    ) -> Self {
        let mut framework = Self::new(PolicyType::RealTime, capacity, process_table, context_switch);
        framework.active = Box::new(RealTime::new(capacity, algorithm));
        framework
    }

    pub fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    pub fn running(&self) -> Pid {
        self.running
    }

    pub fn scheduler_init(&mut self) {
        self.active.init();
    }

    pub fn scheduler_shutdown(&mut self) {
        self.active.shutdown();
    }

    /// Replaces the active policy with a fresh instance of
    /// `policy_type`. Cumulative stats persist across the switch;
    /// ready-queue membership does not — a switch is a hard reset of
    /// scheduling state, so the caller is expected to re-admit whatever
    /// processes are still runnable via `sched_ready`.
    pub fn scheduler_switch(&mut self, policy_type: PolicyType) {
        let _guard = self.interrupt_mask.scoped();
        let _sem = self.semaphore.wait();
        self.active.shutdown();
        self.active = make_policy(policy_type, self.capacity);
        self.active.init();
        self.policy_type = policy_type;
        self.fallback_ready.clear();
        self.need_resched = true;
        self.stats.record_policy_switch();
    }

    /// Same as [`Self::scheduler_switch`] but takes the policy's
    /// wire/CLI name, returning [`SwitchError`] for an unrecognised one
    /// instead of panicking.
    pub fn scheduler_switch_named(&mut self, name: &str) -> Result<(), SwitchError> {
        let policy_type = PolicyType::parse(name).ok_or_else(|| SwitchError(name.to_string()))?;
        self.scheduler_switch(policy_type);
        Ok(())
    }

    /// Runs the active policy's selection and performs the context
    /// switch if the winner differs from whoever is currently running.
    pub fn schedule(&mut self) -> Pid {
        let _guard = self.interrupt_mask.scoped();
        self.stats.record_schedule();
        let decision = self.active.schedule();
        self.dispatch(decision.next);
        self.need_resched = false;
        self.running
    }

    fn dispatch(&mut self, next: Pid) {
        if next == self.running {
            return;
        }
        if self.running != NO_PID && self.process_table.state(self.running) == Some(ProcessState::Running) {
            self.process_table.set_state(self.running, ProcessState::Ready);
        }
        if next != NO_PID {
            self.process_table.set_state(next, ProcessState::Running);
            self.proc_stats.record_scheduled(next);
        }
        self.context_switch.switch(self.running, next);
        self.stats.record_context_switch();
        self.running = next;
    }

    /// Reschedules only if something has flagged `need_resched` since
    /// the last call — a cheap no-op otherwise.
    pub fn resched(&mut self) -> Pid {
        if self.need_resched {
            self.schedule()
        } else {
            self.running
        }
    }

    pub fn yield_(&mut self) -> Pid {
        let _guard = self.interrupt_mask.scoped();
        self.stats.record_yield();
        if self.active.yield_now() {
            self.schedule()
        } else {
            self.running
        }
    }

    pub fn preempt(&mut self) -> Pid {
        let _guard = self.interrupt_mask.scoped();
        self.stats.record_preemption();
        if self.active.preempt() {
            self.schedule()
        } else {
            self.running
        }
    }

    pub fn sched_ready(&mut self, pid: Pid) -> bool {
        let _guard = self.interrupt_mask.scoped();
        if !self.process_table.is_valid(pid) {
            return false;
        }
        let priority = self.process_table.priority(pid).unwrap_or(0);
        self.process_table.set_state(pid, ProcessState::Ready);
        if !self.active.enqueue(pid, priority) {
            self.fallback_ready.push_back(pid);
        }
        true
    }

    /// Alias for `sched_ready` under the name spec.md §6 uses for a
    /// blocked process becoming runnable again.
    pub fn sched_wakeup(&mut self, pid: Pid) -> bool {
        self.sched_ready(pid)
    }

    pub fn sched_block(&mut self, pid: Pid) -> bool {
        let _guard = self.interrupt_mask.scoped();
        if !self.process_table.is_valid(pid) {
            return false;
        }
        self.process_table.set_state(pid, ProcessState::Blocked);
        if !self.active.dequeue(pid) {
            self.fallback_ready.retain(|&p| p != pid);
        }
        if self.running == pid {
            self.running = NO_PID;
            self.need_resched = true;
        }
        true
    }

    pub fn sched_new_process(&mut self, pid: Pid, priority: i32) -> bool {
        let _guard = self.interrupt_mask.scoped();
        self.process_table.set_priority(pid, priority);
        self.process_table.set_state(pid, ProcessState::Ready);
        if !self.active.enqueue(pid, priority) {
            self.fallback_ready.push_back(pid);
        }
        true
    }

    pub fn sched_exit(&mut self, pid: Pid) -> bool {
        let _guard = self.interrupt_mask.scoped();
        if !self.active.dequeue(pid) {
            self.fallback_ready.retain(|&p| p != pid);
        }
        self.process_table.set_state(pid, ProcessState::Free);
        if self.running == pid {
            self.running = NO_PID;
            self.need_resched = true;
        }
        true
    }

    fn validate_live_pid(&self, pid: Pid) -> Result<(), PidError> {
        if !(0..NPROC as i32).contains(&pid) {
            return Err(PidError::OutOfRange(pid));
        }
        match self.process_table.state(pid) {
            None | Some(ProcessState::Free) => Err(PidError::Free(pid)),
            Some(_) => Ok(()),
        }
    }

    pub fn setpriority(&mut self, pid: Pid, priority: i32) -> Result<(), PidError> {
        self.validate_live_pid(pid)?;
        self.process_table.set_priority(pid, priority);
        if self.active.set_priority(pid, priority) == Some(true) {
            self.need_resched = true;
        }
        Ok(())
    }

    pub fn getpriority(&self, pid: Pid) -> Result<i32, PidError> {
        self.validate_live_pid(pid)?;
        Ok(self.process_table.priority(pid).unwrap_or(0))
    }

    /// Adjusts priority by `delta`, clamped to the range the active
    /// policy understands (CFS treats this as a nice value in [-20,
    /// 19]; every other policy treats it as [0, 99]).
    pub fn nice(&mut self, pid: Pid, delta: i32) -> Result<i32, PidError> {
        let current = self.getpriority(pid)?;
        let (lo, hi) = if self.policy_type == PolicyType::Cfs {
            (-20, 19)
        } else {
            (PRIORITY_MIN, PRIORITY_MAX)
        };
        let updated = clamp(current + delta, lo, hi);
        self.setpriority(pid, updated)?;
        Ok(updated)
    }

    pub fn sched_set_quantum(&mut self, quantum: u32) -> bool {
        self.active.set_quantum(quantum)
    }

    pub fn sched_get_quantum(&self) -> Option<u32> {
        self.active.get_quantum()
    }

    /// Advances the system clock by one tick and reschedules if the
    /// active policy (or the tick accounting below) now wants one.
    pub fn sched_tick(&mut self) -> Pid {
        let _guard = self.interrupt_mask.scoped();
        self.system_ticks += 1;
        self.stats.record_tick();
        if self.running != NO_PID {
            self.proc_stats.record_run_tick(self.running);
        }
        for &pid in &self.fallback_ready {
            self.proc_stats.record_wait_tick(pid);
        }
        if self.active.tick() {
            self.need_resched = true;
        }
        self.resched()
    }

    pub fn sched_get_time(&self) -> u64 {
        self.system_ticks
    }

    pub fn sched_get_stats(&self) -> GlobalStats {
        self.stats.clone()
    }

    pub fn sched_get_proc_stats(&self, pid: Pid) -> ProcStats {
        self.proc_stats.get(pid)
    }

    pub fn sched_reset_stats(&mut self) {
        self.stats.reset();
        self.proc_stats.reset();
        self.active.reset_stats();
    }

    /// Runs the active policy's structural validation, logging every
    /// finding at `error` level. Returns `true` iff nothing was found —
    /// the core keeps running either way (spec.md §7).
    pub fn sched_validate(&self) -> bool {
        let findings = self.active.validate();
        for finding in &findings {
            error!(%finding, policy = self.active.name(), "scheduler validation finding");
        }
        findings.is_empty()
    }

    pub fn sched_dump(&self) -> String {
        self.active.dump()
    }

    pub fn sched_print_stats(&self) -> String {
        self.active.print_stats()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
