/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Round-robin: circular doubly-linked FIFO with equal quantum
//! (spec.md §4.2).

use std::fmt::Write as _;

use tracing::debug;

use crate::config::clamp;
use crate::error::ValidationFinding;
use crate::pool::{NodeIndex, NodePool, NONE};
use crate::policy::{Policy, PolicyStats, PolicyType, ScheduleDecision};
use crate::process::{Pid, NO_PID};

const QUANTUM_MIN: u32 = 1;
const QUANTUM_MAX: u32 = 100;
const DEFAULT_QUANTUM: u32 = 10;

struct RrNode {
    pid: Pid,
    time_remaining: u32,
    total_time: u64,
    rounds: u64,
    prev: NodeIndex,
    next: NodeIndex,
}

/// Round-robin ready queue. `head` is the node whose pid `pick_next`
/// returns — the current cursor position in the circular list.
pub struct RoundRobin {
    pool: NodePool<RrNode>,
    head: NodeIndex,
    count: usize,
    quantum: u32,
    schedule_calls: u64,
    rotations: u64,
}

impl RoundRobin {
    pub fn new(capacity: usize) -> Self {
        RoundRobin {
            pool: NodePool::with_capacity(capacity),
            head: NONE,
            count: 0,
            quantum: DEFAULT_QUANTUM,
            schedule_calls: 0,
            rotations: 0,
        }
    }

    /// Advance the cursor to the next node and reset its slice.
    fn rotate(&mut self) {
        if self.count == 0 {
            return;
        }
        let head_node = self.pool.get(self.head).expect("head must be occupied");
        let next = head_node.next;
        self.head = next;
        let quantum = self.quantum;
        if let Some(node) = self.pool.get_mut(self.head) {
            node.time_remaining = quantum;
            node.rounds += 1;
        }
        self.rotations += 1;
    }

    /// Find the pool index holding `pid` by O(n) traversal from `head`
    /// (spec.md §4.2: "dequeue unlinks in O(n)").
    fn find(&self, pid: Pid) -> Option<NodeIndex> {
        if self.head == NONE {
            return None;
        }
        let mut cursor = self.head;
        for _ in 0..self.count {
            if self.pool.get(cursor).map(|n| n.pid) == Some(pid) {
                return Some(cursor);
            }
            cursor = self.pool.get(cursor).unwrap().next;
        }
        None
    }
}

impl Policy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::RoundRobin
    }

    fn pick_next(&self) -> Pid {
        self.pool.get(self.head).map(|n| n.pid).unwrap_or(NO_PID)
    }

    fn schedule(&mut self) -> ScheduleDecision {
        self.schedule_calls += 1;
        ScheduleDecision {
            next: self.pick_next(),
            switched: false,
        }
    }

    fn enqueue(&mut self, pid: Pid, priority: i32) -> bool {
        let _ = priority;
        let idx = match self.pool.alloc(RrNode {
            pid,
            time_remaining: self.quantum,
            total_time: 0,
            rounds: 0,
            prev: NONE,
            next: NONE,
        }) {
            Some(idx) => idx,
            None => {
                debug!(pid, "RR pool exhausted — enqueue dropped");
                return true; // handled: the silent-no-op IS the spec'd behavior
            }
        };

        if self.head == NONE {
            self.pool.get_mut(idx).unwrap().next = idx;
            self.pool.get_mut(idx).unwrap().prev = idx;
            self.head = idx;
        } else {
            let tail = self.pool.get(self.head).unwrap().prev;
            self.pool.get_mut(idx).unwrap().prev = tail;
            self.pool.get_mut(idx).unwrap().next = self.head;
            self.pool.get_mut(tail).unwrap().next = idx;
            self.pool.get_mut(self.head).unwrap().prev = idx;
        }
        self.count += 1;
        true
    }

    fn dequeue(&mut self, pid: Pid) -> bool {
        let idx = match self.find(pid) {
            Some(idx) => idx,
            None => return true, // no-op on non-member, per spec.md §3
        };

        let (prev, next) = {
            let node = self.pool.get(idx).unwrap();
            (node.prev, node.next)
        };

        if self.count == 1 {
            self.head = NONE;
        } else {
            self.pool.get_mut(prev).unwrap().next = next;
            self.pool.get_mut(next).unwrap().prev = prev;
            if self.head == idx {
                self.head = next;
            }
        }
        self.pool.free(idx);
        self.count -= 1;
        true
    }

    fn yield_now(&mut self) -> bool {
        if let Some(node) = self.pool.get_mut(self.head) {
            node.time_remaining = 0;
        }
        self.rotate();
        true
    }

    fn set_quantum(&mut self, quantum: u32) -> bool {
        self.quantum = clamp(quantum, QUANTUM_MIN, QUANTUM_MAX);
        true
    }

    fn get_quantum(&self) -> Option<u32> {
        Some(self.quantum)
    }

    fn tick(&mut self) -> bool {
        if self.count == 0 {
            return false;
        }
        let exhausted = {
            let node = self.pool.get_mut(self.head).unwrap();
            node.total_time += 1;
            node.time_remaining = node.time_remaining.saturating_sub(1);
            node.time_remaining == 0
        };
        if exhausted {
            self.rotate();
            true
        } else {
            false
        }
    }

    fn get_stats(&self) -> PolicyStats {
        let mut extra = std::collections::HashMap::new();
        extra.insert("rotations".to_string(), self.rotations as f64);
        extra.insert("quantum".to_string(), self.quantum as f64);
        PolicyStats {
            ready_count: self.count,
            schedule_calls: self.schedule_calls,
            extra,
        }
    }

    fn reset_stats(&mut self) {
        self.schedule_calls = 0;
        self.rotations = 0;
    }

    fn print_stats(&self) -> String {
        format!(
            "RR: count={} quantum={} rotations={} schedule_calls={}",
            self.count, self.quantum, self.rotations, self.schedule_calls
        )
    }

    fn validate(&self) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();

        if self.count == 0 {
            if self.head != NONE {
                findings.push(ValidationFinding::Other {
                    detail: "RR: count is 0 but head is set".to_string(),
                });
            }
            return findings;
        }

        let mut cursor = self.head;
        let mut steps = 0usize;
        loop {
            let node = match self.pool.get(cursor) {
                Some(n) => n,
                None => {
                    findings.push(ValidationFinding::LinkCorruption {
                        detail: "RR: cursor points at a freed slot".to_string(),
                    });
                    return findings;
                }
            };
            let next = node.next;
            if self.pool.get(next).map(|n| n.prev) != Some(cursor) {
                findings.push(ValidationFinding::LinkCorruption {
                    detail: format!("RR: node.next.prev != node at index {cursor}"),
                });
                return findings;
            }
            cursor = next;
            steps += 1;
            if steps > self.count {
                findings.push(ValidationFinding::LinkCorruption {
                    detail: "RR: traversal did not return to head within `count` steps".to_string(),
                });
                return findings;
            }
            if cursor == self.head {
                break;
            }
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
        let _ = writeln!(out, "RoundRobin: quantum={} count={}", self.quantum, self.count);
        if self.head != NONE {
            let mut cursor = self.head;
            for _ in 0..self.count {
                let node = self.pool.get(cursor).unwrap();
                let _ = writeln!(
                    out,
                    "  pid={} remaining={} total={} rounds={}",
                    node.pid, node.time_remaining, node.total_time, node.rounds
                );
                cursor = node.next;
            }
        }
        out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_round_trip_restores_empty_state() {
        let mut rr = RoundRobin::new(8);
        rr.enqueue(1, 0);
        rr.dequeue(1);
        assert_eq!(rr.count, 0);
        assert_eq!(rr.head, NONE);
        assert!(rr.validate().is_empty());
    }

    #[test]
    fn dequeue_nonmember_is_noop() {
        let mut rr = RoundRobin::new(8);
        rr.enqueue(1, 0);
        assert!(rr.dequeue(42));
        assert_eq!(rr.count, 1);
    }

    #[test]
    fn rotation_cycles_through_all_three_processes() {
        // spec.md §8 scenario 1: pids 1,2,3 at quantum 10.
        let mut rr = RoundRobin::new(8);
        rr.set_quantum(10);
        rr.enqueue(1, 0);
        rr.enqueue(2, 0);
        rr.enqueue(3, 0);

        assert_eq!(rr.pick_next(), 1);
        for _ in 0..10 {
            rr.tick();
        }
        assert_eq!(rr.pick_next(), 2);
        for _ in 0..10 {
            rr.tick();
        }
        assert_eq!(rr.pick_next(), 3);
        assert_eq!(rr.count, 3);
        assert_eq!(rr.rotations, 2);
    }

    #[test]
    fn quantum_is_clamped_to_documented_range() {
        let mut rr = RoundRobin::new(4);
        rr.set_quantum(0);
        assert_eq!(rr.get_quantum(), Some(1));
        rr.set_quantum(1000);
        assert_eq!(rr.get_quantum(), Some(100));
    }

    #[test]
    fn yield_forces_immediate_rotation() {
        let mut rr = RoundRobin::new(4);
        rr.enqueue(1, 0);
        rr.enqueue(2, 0);
        assert_eq!(rr.pick_next(), 1);
        rr.yield_now();
        assert_eq!(rr.pick_next(), 2);
    }

    #[test]
    fn enqueue_past_capacity_is_silent_noop() {
        let mut rr = RoundRobin::new(1);
        assert!(rr.enqueue(1, 0));
        assert!(rr.enqueue(2, 0)); // handled == "silently dropped", not a crash
        assert_eq!(rr.count, 1);
        assert!(rr.validate().is_empty());
    }

    #[test]
    fn validate_detects_broken_link() {
        let mut rr = RoundRobin::new(4);
        rr.enqueue(1, 0);
        rr.enqueue(2, 0);
        // Corrupt the structure directly to exercise validate()'s detection path.
        let head = rr.head;
        rr.pool.get_mut(head).unwrap().next = head; // self-loop, breaks ring of 2
        let findings = rr.validate();
        assert!(!findings.is_empty());
    }
}
