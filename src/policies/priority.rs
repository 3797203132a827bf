/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Priority scheduling with aging and a starvation guard (spec.md
//! §4.3): a singly-linked list kept sorted descending by
//! `current_priority`.

use std::fmt::Write as _;

use tracing::debug;

use crate::config::{clamp, PRIORITY_MAX, PRIORITY_MIN};
use crate::error::ValidationFinding;
use crate::pool::{NodeIndex, NodePool, NONE};
use crate::policy::{Policy, PolicyStats, PolicyType, ScheduleDecision};
use crate::process::{Pid, NO_PID};

struct PrioNode {
    pid: Pid,
    base_priority: i32,
    current_priority: i32,
    wait_time: u64,
    last_run: u64,
    next: NodeIndex,
}

pub struct Priority {
    pool: NodePool<PrioNode>,
    head: NodeIndex,
    count: usize,
    aging_interval: u64,
    aging_amount: i32,
    starvation_threshold: u64,
    starvation_boost: i32,
    ticks: u64,
    schedule_calls: u64,
}

impl Priority {
    pub fn new(capacity: usize) -> Self {
        Priority {
            pool: NodePool::with_capacity(capacity),
            head: NONE,
            count: 0,
            aging_interval: crate::config::AGING_INTERVAL,
            aging_amount: crate::config::AGING_AMOUNT,
            starvation_threshold: crate::config::STARVATION_THRESHOLD,
            starvation_boost: crate::config::STARVATION_BOOST,
            ticks: 0,
            schedule_calls: 0,
        }
    }

    pub fn with_tunables(
        capacity: usize,
        aging_interval: u64,
        aging_amount: i32,
        starvation_threshold: u64,
        starvation_boost: i32,
    ) -> Self {
        let mut p = Self::new(capacity);
        p.aging_interval = aging_interval.max(1);
        p.aging_amount = aging_amount;
        p.starvation_threshold = starvation_threshold;
        p.starvation_boost = starvation_boost;
        p
    }

    /// Set whether the background aging loop is active.
    pub fn disable_aging(&mut self) {
        self.aging_interval = u64::MAX;
    }

    fn find(&self, pid: Pid) -> Option<NodeIndex> {
        let mut cursor = self.head;
        while cursor != NONE {
            if self.pool.get(cursor).unwrap().pid == pid {
                return Some(cursor);
            }
            cursor = self.pool.get(cursor).unwrap().next;
        }
        None
    }

    /// Insert `idx` into the descending-sorted list. Ties keep FIFO
    /// order (new node goes after existing nodes of equal priority).
    fn insert_sorted(&mut self, idx: NodeIndex) {
        let priority = self.pool.get(idx).unwrap().current_priority;

        if self.head == NONE || self.pool.get(self.head).unwrap().current_priority < priority {
            self.pool.get_mut(idx).unwrap().next = self.head;
            self.head = idx;
            return;
        }

        let mut cursor = self.head;
        loop {
            let next = self.pool.get(cursor).unwrap().next;
            if next == NONE || self.pool.get(next).unwrap().current_priority < priority {
                self.pool.get_mut(idx).unwrap().next = next;
                self.pool.get_mut(cursor).unwrap().next = idx;
                return;
            }
            cursor = next;
        }
    }

    fn unlink(&mut self, idx: NodeIndex) {
        if self.head == idx {
            self.head = self.pool.get(idx).unwrap().next;
            return;
        }
        let mut cursor = self.head;
        while cursor != NONE {
            let next = self.pool.get(cursor).unwrap().next;
            if next == idx {
                let after = self.pool.get(idx).unwrap().next;
                self.pool.get_mut(cursor).unwrap().next = after;
                return;
            }
            cursor = next;
        }
    }

    /// Re-sort `idx` after its `current_priority` changed.
    fn reinsert(&mut self, idx: NodeIndex) {
        self.unlink(idx);
        self.pool.get_mut(idx).unwrap().next = NONE;
        self.insert_sorted(idx);
    }
}

impl Policy for Priority {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::Priority
    }

    fn pick_next(&self) -> Pid {
        self.pool.get(self.head).map(|n| n.pid).unwrap_or(NO_PID)
    }

    fn schedule(&mut self) -> ScheduleDecision {
        self.schedule_calls += 1;
        if let Some(node) = self.pool.get_mut(self.head) {
            node.wait_time = 0;
            node.last_run = self.ticks;
        }
        ScheduleDecision {
            next: self.pick_next(),
            switched: false,
        }
    }

    fn enqueue(&mut self, pid: Pid, priority: i32) -> bool {
        let priority = clamp(priority, PRIORITY_MIN, PRIORITY_MAX);
        let idx = match self.pool.alloc(PrioNode {
            pid,
            base_priority: priority,
            current_priority: priority,
            wait_time: 0,
            last_run: 0,
            next: NONE,
        }) {
            Some(idx) => idx,
            None => {
                debug!(pid, "priority pool exhausted — enqueue dropped");
                return true;
            }
        };
        self.insert_sorted(idx);
        self.count += 1;
        true
    }

    fn dequeue(&mut self, pid: Pid) -> bool {
        let idx = match self.find(pid) {
            Some(idx) => idx,
            None => return true,
        };
        self.unlink(idx);
        self.pool.free(idx);
        self.count -= 1;
        true
    }

    /// Clamps to [0, 99] and re-inserts. Returns `need_resched = true`
    /// if re-insertion moved the node under priority inversion (i.e.
    /// its priority no longer keeps it at the list head while it was
    /// previously running there, or it moved relative to the head at
    /// all) — spec.md §4.3: "re-insertion under priority inversion
    /// raises need_resched".
    fn set_priority(&mut self, pid: Pid, priority: i32) -> Option<bool> {
        let idx = self.find(pid)?;
        let was_head = self.head == idx;
        let clamped = clamp(priority, PRIORITY_MIN, PRIORITY_MAX);
        self.pool.get_mut(idx).unwrap().current_priority = clamped;
        self.pool.get_mut(idx).unwrap().base_priority = clamped;
        self.reinsert(idx);
        let is_head = self.head == idx;
        Some(was_head != is_head)
    }

    fn get_priority(&self, pid: Pid) -> Option<i32> {
        self.find(pid).map(|idx| self.pool.get(idx).unwrap().current_priority)
    }

    fn boost_priority(&mut self, pid: Pid) {
        if let Some(idx) = self.find(pid) {
            let boosted = clamp(
                self.pool.get(idx).unwrap().current_priority + self.starvation_boost,
                PRIORITY_MIN,
                PRIORITY_MAX,
            );
            self.pool.get_mut(idx).unwrap().current_priority = boosted;
            self.reinsert(idx);
        }
    }

    fn decay_priority(&mut self, pid: Pid) {
        if let Some(idx) = self.find(pid) {
            let node = self.pool.get(idx).unwrap();
            let decayed = (node.current_priority - self.aging_amount).max(node.base_priority);
            self.pool.get_mut(idx).unwrap().current_priority = decayed;
            self.reinsert(idx);
        }
    }

    fn tick(&mut self) -> bool {
        self.ticks += 1;
        let mut need_resched = false;

        // Every queued node waits one more tick; nodes past the
        // starvation threshold are boosted immediately and reset.
        let mut boosted: Vec<NodeIndex> = Vec::new();
        let mut cursor = self.head;
        while cursor != NONE {
            let next = self.pool.get(cursor).unwrap().next;
            let node = self.pool.get_mut(cursor).unwrap();
            node.wait_time += 1;
            if node.wait_time > self.starvation_threshold {
                node.current_priority = clamp(
                    node.current_priority + self.starvation_boost,
                    PRIORITY_MIN,
                    PRIORITY_MAX,
                );
                node.wait_time = 0;
                boosted.push(cursor);
            }
            cursor = next;
        }
        for idx in boosted {
            self.reinsert(idx);
        }

        // Global aging loop (every `aging_interval` ticks). The node at
        // the head is whoever the framework is currently running — it
        // doesn't need a boost to keep its place, so only the waiting
        // tail ages. The head is reinserted last, so a waiter that
        // ages up to an exact tie with it displaces it instead of
        // settling in behind (spec.md §8 scenario 2: the starved
        // waiter must overtake once it reaches the runner's priority).
        if self.aging_interval != u64::MAX && self.ticks % self.aging_interval == 0 && self.head != NONE {
            let old_head = self.head;
            let running_idx = self.head;
            let mut waiting = Vec::new();
            let mut cursor = self.pool.get(running_idx).unwrap().next;
            while cursor != NONE {
                waiting.push(cursor);
                cursor = self.pool.get(cursor).unwrap().next;
            }
            for &idx in &waiting {
                let node = self.pool.get_mut(idx).unwrap();
                node.current_priority = clamp(node.current_priority + self.aging_amount, PRIORITY_MIN, PRIORITY_MAX);
            }
            // Rebuild order from scratch: waiters first, runner last.
            self.head = NONE;
            for idx in waiting {
                self.pool.get_mut(idx).unwrap().next = NONE;
                self.insert_sorted(idx);
            }
            self.pool.get_mut(running_idx).unwrap().next = NONE;
            self.insert_sorted(running_idx);
            if self.head != old_head {
                need_resched = true;
            }
        }

        need_resched
    }

    fn get_stats(&self) -> PolicyStats {
        let mut extra = std::collections::HashMap::new();
        extra.insert("aging_interval".to_string(), self.aging_interval as f64);
        PolicyStats {
            ready_count: self.count,
            schedule_calls: self.schedule_calls,
            extra,
        }
    }

    fn reset_stats(&mut self) {
        self.schedule_calls = 0;
    }

    fn print_stats(&self) -> String {
        format!("PRIO: count={} ticks={}", self.count, self.ticks)
    }

    fn validate(&self) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        let mut cursor = self.head;
        let mut steps = 0usize;
        let mut prev_priority: Option<i32> = None;
        while cursor != NONE {
            let node = self.pool.get(cursor).unwrap();
            if let Some(prev) = prev_priority {
                if prev < node.current_priority {
                    findings.push(ValidationFinding::OrderingViolation {
                        detail: format!(
                            "priority list not descending: {prev} precedes {}",
                            node.current_priority
                        ),
                    });
                }
            }
            if node.base_priority > node.current_priority {
                findings.push(ValidationFinding::Other {
                    detail: format!("pid {}: base {} > current {}", node.pid, node.base_priority, node.current_priority),
                });
            }
            prev_priority = Some(node.current_priority);
            cursor = node.next;
            steps += 1;
        }
        if steps != self.count {
            findings.push(ValidationFinding::CountMismatch {
                counted: steps,
                tracked: self.count,
            });
        }
        if !self.pool.accounting_is_consistent() {
            findings.push(ValidationFinding::PoolAccountingMismatch {
                free: self.pool.free_count(),
                in_use: self.pool.in_use(),
                pool_size: self.pool.capacity(),
            });
        }
        findings
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Priority: count={}", self.count);
        let mut cursor = self.head;
        while cursor != NONE {
            let node = self.pool.get(cursor).unwrap();
            let _ = writeln!(
                out,
                "  pid={} base={} current={} wait={}",
                node.pid, node.base_priority, node.current_priority, node.wait_time
            );
            cursor = node.next;
        }
        out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_next_returns_highest_priority() {
        let mut p = Priority::new(8);
        p.enqueue(1, 10);
        p.enqueue(2, 90);
        assert_eq!(p.pick_next(), 2);
    }

    #[test]
    fn list_stays_sorted_descending_after_inserts() {
        let mut p = Priority::new(8);
        p.enqueue(1, 10);
        p.enqueue(2, 90);
        p.enqueue(3, 50);
        assert!(p.validate().is_empty());
        assert_eq!(p.pick_next(), 2);
    }

    #[test]
    fn enqueue_dequeue_round_trip_restores_empty_state() {
        let mut p = Priority::new(8);
        p.enqueue(1, 50);
        p.dequeue(1);
        assert_eq!(p.count, 0);
        assert_eq!(p.head, NONE);
    }

    #[test]
    fn set_priority_is_idempotent_under_repeated_calls() {
        let mut p = Priority::new(8);
        p.enqueue(1, 10);
        p.set_priority(1, 80);
        p.set_priority(1, 20);
        assert_eq!(p.get_priority(1), Some(20));
    }

    #[test]
    fn priority_aging_eventually_promotes_starved_process() {
        // spec.md §8 scenario 2: pid 1 @ 10, pid 2 @ 90; aging
        // interval=10, amount=1; after 800 ticks pid 1 reaches 90.
        let mut p = Priority::with_tunables(8, 10, 1, u64::MAX, 0);
        p.enqueue(1, 10);
        p.enqueue(2, 90);
        assert_eq!(p.pick_next(), 2);

        for _ in 0..800 {
            p.schedule();
            p.tick();
        }
        assert_eq!(p.get_priority(1), Some(90));
        assert_eq!(p.pick_next(), 1);
    }

    #[test]
    fn aging_disabled_never_changes_order() {
        let mut p = Priority::new(8);
        p.disable_aging();
        p.enqueue(1, 10);
        p.enqueue(2, 90);
        for _ in 0..1000 {
            p.tick();
        }
        assert_eq!(p.pick_next(), 2);
    }

    #[test]
    fn starvation_guard_boosts_long_waiting_process() {
        let mut p = Priority::with_tunables(8, u64::MAX, 0, 5, 50);
        p.enqueue(1, 10);
        p.enqueue(2, 90);
        // pid 1 waits every tick (never scheduled); after threshold it's boosted.
        for _ in 0..6 {
            p.tick();
        }
        assert!(p.get_priority(1).unwrap() > 10);
    }

    #[test]
    fn decay_never_drops_below_base_priority() {
        let mut p = Priority::new(8);
        p.enqueue(1, 50);
        p.boost_priority(1); // bump current above base
        for _ in 0..100 {
            p.decay_priority(1);
        }
        assert!(p.get_priority(1).unwrap() >= 50);
    }
}
