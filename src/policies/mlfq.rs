/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Multi-level feedback queue (spec.md §4.4): eight priority levels,
//! each an independent FIFO, with quantum that doubles per level,
//! demotion on allotment exhaustion, a periodic global boost, and an
//! I/O-bonus promotion for processes that repeatedly give the CPU back
//! before their quantum runs out.

use std::fmt::Write as _;

use tracing::debug;

use crate::config::clamp;
use crate::error::ValidationFinding;
use crate::pool::{NodeIndex, NodePool, NONE};
use crate::policy::{Policy, PolicyStats, PolicyType, ScheduleDecision};
use crate::process::{Pid, NO_PID};

const NUM_LEVELS: usize = crate::config::MLFQ_NUM_LEVELS;

struct MlfqNode {
    pid: Pid,
    level: usize,
    time_used_since_boost: u64,
    quantum_remaining: u32,
    io_count: u32,
    next: NodeIndex,
}

#[derive(Clone, Copy)]
struct Level {
    head: NodeIndex,
    tail: NodeIndex,
    count: usize,
}

impl Level {
    const EMPTY: Level = Level {
        head: NONE,
        tail: NONE,
        count: 0,
    };
}

/// Level/io-count remembered for a process while it is off the ready
/// list (blocked), so a wakeup resumes it where it left off instead of
/// re-banding it from scratch.
#[derive(Clone, Copy)]
struct Suspended {
    level: usize,
    io_count: u32,
    time_used_since_boost: u64,
}

pub struct Mlfq {
    pool: NodePool<MlfqNode>,
    levels: [Level; NUM_LEVELS],
    suspended: std::collections::HashMap<Pid, Suspended>,
    ticks: u64,
    boost_interval: u64,
    io_bonus_levels: i32,
    io_threshold: u32,
    schedule_calls: u64,
    boosts: u64,
    demotions: u64,
    io_promotions: u64,
}

fn quantum_for(level: usize) -> u32 {
    2u32.saturating_mul(1u32 << level.min(16))
}

fn allotment_for(level: usize) -> u64 {
    2 * quantum_for(level) as u64
}

/// Initial level from the process's base priority band (spec.md §4.4):
/// higher band → lower (more favoured) level number.
fn initial_level(priority: i32) -> usize {
    use crate::config::{PRIORITY_HIGH, PRIORITY_LOW, PRIORITY_MID};
    if priority >= PRIORITY_HIGH {
        0
    } else if priority >= PRIORITY_MID {
        2
    } else if priority >= PRIORITY_LOW {
        4
    } else {
        6
    }
}

impl Mlfq {
    pub fn new(capacity: usize) -> Self {
        Mlfq {
            pool: NodePool::with_capacity(capacity),
            levels: [Level::EMPTY; NUM_LEVELS],
            suspended: std::collections::HashMap::new(),
            ticks: 0,
            boost_interval: crate::config::MLFQ_BOOST_INTERVAL,
            io_bonus_levels: crate::config::MLFQ_IO_BONUS_LEVELS,
            io_threshold: crate::config::MLFQ_IO_THRESHOLD,
            schedule_calls: 0,
            boosts: 0,
            demotions: 0,
            io_promotions: 0,
        }
    }

    pub fn with_tunables(capacity: usize, boost_interval: u64, io_bonus_levels: i32, io_threshold: u32) -> Self {
        let mut m = Self::new(capacity);
        m.boost_interval = boost_interval.max(1);
        m.io_bonus_levels = io_bonus_levels;
        m.io_threshold = io_threshold;
        m
    }

    fn lowest_nonempty(&self) -> Option<usize> {
        self.levels.iter().position(|l| l.count > 0)
    }

    fn find(&self, pid: Pid) -> Option<(usize, NodeIndex)> {
        for (level, q) in self.levels.iter().enumerate() {
            let mut cursor = q.head;
            while cursor != NONE {
                if self.pool.get(cursor).unwrap().pid == pid {
                    return Some((level, cursor));
                }
                cursor = self.pool.get(cursor).unwrap().next;
            }
        }
        None
    }

    fn push_tail(&mut self, level: usize, idx: NodeIndex) {
        self.pool.get_mut(idx).unwrap().next = NONE;
        let q = &mut self.levels[level];
        if q.head == NONE {
            q.head = idx;
            q.tail = idx;
        } else {
            self.pool.get_mut(q.tail).unwrap().next = idx;
            self.levels[level].tail = idx;
        }
        self.levels[level].count += 1;
    }

    /// Unlink `idx` from `level`'s list. O(n) within the level, mirroring
    /// the linear-scan dequeue used throughout this crate's other
    /// linked-list policies.
    fn unlink(&mut self, level: usize, idx: NodeIndex) {
        let q = self.levels[level];
        if q.head == idx {
            let next = self.pool.get(idx).unwrap().next;
            self.levels[level].head = next;
            if self.levels[level].tail == idx {
                self.levels[level].tail = NONE;
            }
        } else {
            let mut cursor = q.head;
            while cursor != NONE {
                let next = self.pool.get(cursor).unwrap().next;
                if next == idx {
                    let after = self.pool.get(idx).unwrap().next;
                    self.pool.get_mut(cursor).unwrap().next = after;
                    if self.levels[level].tail == idx {
                        self.levels[level].tail = cursor;
                    }
                    break;
                }
                cursor = next;
            }
        }
        self.levels[level].count -= 1;
    }

    fn move_to_level(&mut self, from: usize, idx: NodeIndex, to: usize) {
        self.unlink(from, idx);
        let to = to.min(NUM_LEVELS - 1);
        self.pool.get_mut(idx).unwrap().level = to;
        self.pool.get_mut(idx).unwrap().quantum_remaining = quantum_for(to);
        self.push_tail(to, idx);
    }

    fn total_count(&self) -> usize {
        self.levels.iter().map(|l| l.count).sum()
    }
}

impl Policy for Mlfq {
    fn name(&self) -> &'static str {
        "mlfq"
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::Mlfq
    }

    fn pick_next(&self) -> Pid {
        match self.lowest_nonempty() {
            Some(level) => self.pool.get(self.levels[level].head).map(|n| n.pid).unwrap_or(NO_PID),
            None => NO_PID,
        }
    }

    fn schedule(&mut self) -> ScheduleDecision {
        self.schedule_calls += 1;
        ScheduleDecision {
            next: self.pick_next(),
            switched: false,
        }
    }

    fn enqueue(&mut self, pid: Pid, priority: i32) -> bool {
        // A process resuming from a block keeps the level/io history it
        // had when it left the ready list; a genuinely new process is
        // banded from its priority (spec.md §4.4).
        let (level, io_count, time_used_since_boost) = match self.suspended.remove(&pid) {
            Some(s) => (s.level, s.io_count, s.time_used_since_boost),
            None => (initial_level(priority), 0, 0),
        };
        let idx = match self.pool.alloc(MlfqNode {
            pid,
            level,
            time_used_since_boost,
            quantum_remaining: quantum_for(level),
            io_count,
            next: NONE,
        }) {
            Some(idx) => idx,
            None => {
                debug!(pid, "MLFQ pool exhausted — enqueue dropped");
                return true;
            }
        };
        self.push_tail(level, idx);
        true
    }

    fn dequeue(&mut self, pid: Pid) -> bool {
        let (level, idx) = match self.find(pid) {
            Some(found) => found,
            None => return true,
        };

        // A process that gives the CPU back with quantum still
        // remaining is behaving like an I/O-bound task; repeated
        // occurrences earn a promotion (spec.md §4.4 "I/O bonus").
        let node = self.pool.get_mut(idx).unwrap();
        if node.quantum_remaining > 0 {
            node.io_count += 1;
        }
        let (mut io_count, mut current_level, time_used_since_boost) = {
            let node = self.pool.get(idx).unwrap();
            (node.io_count, node.level, node.time_used_since_boost)
        };
        if io_count > self.io_threshold {
            let target = current_level as i32 - self.io_bonus_levels;
            let target = clamp(target, 0, (NUM_LEVELS - 1) as i32) as usize;
            io_count = 0;
            if target != current_level {
                current_level = target;
                self.io_promotions += 1;
            }
        }

        self.unlink(level, idx);
        self.pool.free(idx);
        self.suspended.insert(
            pid,
            Suspended {
                level: current_level,
                io_count,
                time_used_since_boost,
            },
        );
        true
    }

    fn tick(&mut self) -> bool {
        self.ticks += 1;
        let mut need_resched = false;

        if let Some(level) = self.lowest_nonempty() {
            let idx = self.levels[level].head;
            let demote = {
                let node = self.pool.get_mut(idx).unwrap();
                node.time_used_since_boost = node.time_used_since_boost.saturating_add(1);
                node.quantum_remaining = node.quantum_remaining.saturating_sub(1);
                node.quantum_remaining == 0
            };
            if demote {
                let time_used = self.pool.get(idx).unwrap().time_used_since_boost;
                if time_used >= allotment_for(level) && level + 1 < NUM_LEVELS {
                    self.move_to_level(level, idx, level + 1);
                    self.pool.get_mut(idx).unwrap().time_used_since_boost = 0;
                    self.demotions += 1;
                } else {
                    // Quantum exhausted but allotment not yet used up
                    // (or already at the lowest level): rotate within
                    // the same level.
                    self.unlink(level, idx);
                    self.pool.get_mut(idx).unwrap().quantum_remaining = quantum_for(level);
                    self.push_tail(level, idx);
                }
                need_resched = true;
            }
        }

        if self.ticks % self.boost_interval == 0 && self.total_count() > 0 {
            let old_head = self.pick_next();
            let mut all_indices = Vec::new();
            for (level, q) in self.levels.iter().enumerate() {
                let mut cursor = q.head;
                while cursor != NONE {
                    all_indices.push((level, cursor));
                    cursor = self.pool.get(cursor).unwrap().next;
                }
            }
            for (level, idx) in all_indices {
                if level != 0 {
                    self.move_to_level(level, idx, 0);
                }
                self.pool.get_mut(idx).unwrap().time_used_since_boost = 0;
                self.pool.get_mut(idx).unwrap().quantum_remaining = quantum_for(0);
            }
            self.boosts += 1;
            if self.pick_next() != old_head {
                need_resched = true;
            }
        }

        need_resched
    }

    fn get_priority(&self, pid: Pid) -> Option<i32> {
        self.find(pid).map(|(level, _)| level as i32)
    }

    fn get_stats(&self) -> PolicyStats {
        let mut extra = std::collections::HashMap::new();
        extra.insert("boosts".to_string(), self.boosts as f64);
        extra.insert("demotions".to_string(), self.demotions as f64);
        extra.insert("io_promotions".to_string(), self.io_promotions as f64);
        for (level, q) in self.levels.iter().enumerate() {
            extra.insert(format!("level_{level}_count"), q.count as f64);
        }
        PolicyStats {
            ready_count: self.total_count(),
            schedule_calls: self.schedule_calls,
            extra,
        }
    }

    fn reset_stats(&mut self) {
        self.schedule_calls = 0;
        self.boosts = 0;
        self.demotions = 0;
        self.io_promotions = 0;
    }

    fn print_stats(&self) -> String {
        format!(
            "MLFQ: count={} boosts={} demotions={} io_promotions={}",
            self.total_count(),
            self.boosts,
            self.demotions,
            self.io_promotions
        )
    }

    fn validate(&self) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        let mut total_steps = 0usize;
        for (level, q) in self.levels.iter().enumerate() {
            let mut cursor = q.head;
            let mut steps = 0usize;
            let mut last = NONE;
            while cursor != NONE {
                last = cursor;
                cursor = self.pool.get(cursor).unwrap().next;
                steps += 1;
                if steps > q.count + 1 {
                    findings.push(ValidationFinding::LinkCorruption {
                        detail: format!("mlfq level {level}: list longer than tracked count"),
                    });
                    break;
                }
            }
            if steps != q.count {
                findings.push(ValidationFinding::CountMismatch {
                    counted: steps,
                    tracked: q.count,
                });
            }
            if q.count > 0 && q.tail != last {
                findings.push(ValidationFinding::LinkCorruption {
                    detail: format!("mlfq level {level}: tail pointer does not match list end"),
                });
            }
            total_steps += steps;
        }
        if !self.pool.accounting_is_consistent() {
            findings.push(ValidationFinding::PoolAccountingMismatch {
                free: self.pool.free_count(),
                in_use: self.pool.in_use(),
                pool_size: self.pool.capacity(),
            });
        }
        let _ = total_steps;
        findings
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "MLFQ: total={}", self.total_count());
        for (level, q) in self.levels.iter().enumerate() {
            let _ = write!(out, "  level {level} (quantum={}): ", quantum_for(level));
            let mut cursor = q.head;
            while cursor != NONE {
                let node = self.pool.get(cursor).unwrap();
                let _ = write!(out, "{} ", node.pid);
                cursor = node.next;
            }
            let _ = writeln!(out);
        }
        out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_priority_process_starts_at_level_zero() {
        let mut m = Mlfq::new(8);
        m.enqueue(1, 90);
        assert_eq!(m.get_priority(1), Some(0));
    }

    #[test]
    fn low_priority_process_starts_at_level_six() {
        let mut m = Mlfq::new(8);
        m.enqueue(1, 5);
        assert_eq!(m.get_priority(1), Some(6));
    }

    #[test]
    fn pick_next_prefers_lower_level() {
        let mut m = Mlfq::new(8);
        m.enqueue(1, 5); // level 6
        m.enqueue(2, 90); // level 0
        assert_eq!(m.pick_next(), 2);
    }

    #[test]
    fn quantum_exhaustion_without_allotment_rotates_in_place() {
        let mut m = Mlfq::new(8);
        m.enqueue(1, 90); // level 0, quantum 2
        m.enqueue(2, 90);
        assert_eq!(m.pick_next(), 1);
        m.tick();
        m.tick(); // quantum of 2 exhausted, allotment is 4: rotate, not demote
        assert_eq!(m.get_priority(1), Some(0));
        assert_eq!(m.pick_next(), 2);
    }

    #[test]
    fn repeated_quantum_exhaustion_demotes_process() {
        let mut m = Mlfq::new(8);
        m.enqueue(1, 90); // level 0: quantum=2, allotment=4
        for _ in 0..4 {
            m.tick();
        }
        assert_eq!(m.get_priority(1), Some(1));
    }

    #[test]
    fn global_boost_resets_every_process_to_level_zero() {
        let mut m = Mlfq::with_tunables(8, 8, 2, 3);
        m.enqueue(1, 5); // level 6
        for _ in 0..8 {
            m.tick();
        }
        assert_eq!(m.get_priority(1), Some(0));
    }

    #[test]
    fn dequeue_before_quantum_exhausted_counts_as_io_event() {
        let mut m = Mlfq::with_tunables(8, 100_000, 2, 3);
        m.enqueue(1, 5); // level 6
        for _ in 0..4 {
            m.dequeue(1);
            m.enqueue(1, 5);
        }
        // 4th dequeue (io_count reaches 4 > threshold 3) promotes by 2 levels.
        assert_eq!(m.get_priority(1), Some(4));
    }

    #[test]
    fn dequeue_nonmember_is_noop() {
        let mut m = Mlfq::new(8);
        assert!(m.dequeue(42));
    }

    #[test]
    fn enqueue_past_capacity_is_silent_noop() {
        let mut m = Mlfq::new(1);
        assert!(m.enqueue(1, 50));
        assert!(m.enqueue(2, 50));
        assert_eq!(m.total_count(), 1);
    }

    #[test]
    fn validate_reports_no_findings_for_healthy_state() {
        let mut m = Mlfq::new(8);
        m.enqueue(1, 50);
        m.enqueue(2, 10);
        assert!(m.validate().is_empty());
    }
}
