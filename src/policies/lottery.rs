/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lottery scheduling (spec.md §4.5): every ready process holds a
//! number of tickets, a winner is drawn each schedule by a reproducible
//! linear-congruential draw over the cumulative ticket range, and
//! ticket transfer/compensation let cooperating or I/O-bound processes
//! adjust their odds.
//!
//! The RNG is a fixed-parameter LCG, not `rand::thread_rng()` — the
//! whole point of a deterministic draw is that the same seed always
//! produces the same sequence of winners, which is what makes the
//! fairness properties in the test scenarios checkable at all.

use std::fmt::Write as _;

use tracing::debug;

use crate::config::clamp;
use crate::error::ValidationFinding;
use crate::pool::{NodeIndex, NodePool, NONE};
use crate::policy::{Policy, PolicyStats, PolicyType, ScheduleDecision};
use crate::process::{Pid, NO_PID};

const LCG_MULTIPLIER: u64 = 1_103_515_245;
const LCG_INCREMENT: u64 = 12_345;
const LCG_MODULUS: u64 = 1 << 32;

/// Fixed-parameter linear congruential generator. Bits [30:16] of each
/// successive state are the output, matching the classic glibc-style
/// `rand()` construction this policy is specified against.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg { state: seed % LCG_MODULUS }
    }

    /// Advance the generator and return a value in `[0, 2^15)`.
    pub fn next_u32(&mut self) -> u32 {
        self.state = (self.state.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT)) % LCG_MODULUS;
        ((self.state >> 16) & 0x7fff) as u32
    }

    /// A draw in `[0, bound)`. `bound` is expected to fit comfortably
    /// under 2^15 (ticket totals are capped well below that in
    /// practice); the modulo bias this introduces is not corrected,
    /// matching the original generator's documented behaviour.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        (self.next_u32() as u64) % bound
    }
}

struct LotteryEntry {
    pid: Pid,
    base_tickets: u32,
    current_tickets: u32,
    compensation: u32,
    wins: u64,
    next: NodeIndex,
}

pub struct Lottery {
    pool: NodePool<LotteryEntry>,
    head: NodeIndex,
    count: usize,
    total_tickets: u64,
    rng: Lcg,
    current_winner: NodeIndex,
    schedule_calls: u64,
    draws: u64,
}

impl Lottery {
    pub fn new(capacity: usize) -> Self {
        Self::with_seed(capacity, 1)
    }

    /// Construct with an explicit RNG seed — tests and reproducible
    /// simulation runs pin this rather than taking whatever the
    /// default happens to be.
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Lottery {
            pool: NodePool::with_capacity(capacity),
            head: NONE,
            count: 0,
            total_tickets: 0,
            rng: Lcg::new(seed),
            current_winner: NONE,
            schedule_calls: 0,
            draws: 0,
        }
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

    /// Draw a winner by walking the list accumulating
    /// `current_tickets + compensation` until the running sum strictly
    /// exceeds the draw.
    fn draw_winner(&mut self) -> NodeIndex {
        if self.total_tickets == 0 {
            return NONE;
        }
        let draw = self.rng.next_below(self.total_tickets);
        self.draws += 1;

        let mut cursor = self.head;
        let mut cumulative = 0u64;
        while cursor != NONE {
            let entry = self.pool.get(cursor).unwrap();
            cumulative += (entry.current_tickets + entry.compensation) as u64;
            if cumulative > draw {
                return cursor;
            }
            cursor = entry.next;
        }
        // Rounding should never leave the walk empty-handed while
        // total_tickets > 0, but fall back to head defensively.
        self.head
    }

    /// Transfer `n` tickets from `from` to `to`, clamped so neither
    /// side's *base* allocation leaves [LOTTERY_MIN_TICKETS,
    /// LOTTERY_MAX_TICKETS].
    pub fn transfer(&mut self, from: Pid, to: Pid, n: u32) -> bool {
        let (Some(from_idx), Some(to_idx)) = (self.find(from), self.find(to)) else {
            return false;
        };
        let from_tickets = self.pool.get(from_idx).unwrap().base_tickets;
        let movable = n.min(from_tickets.saturating_sub(crate::config::LOTTERY_MIN_TICKETS));
        if movable == 0 {
            return false;
        }
        let to_tickets = self.pool.get(to_idx).unwrap().base_tickets;
        let new_to = clamp(
            to_tickets + movable,
            crate::config::LOTTERY_MIN_TICKETS,
            crate::config::LOTTERY_MAX_TICKETS,
        );
        let actually_moved = new_to - to_tickets;
        if actually_moved == 0 {
            return false;
        }

        self.pool.get_mut(from_idx).unwrap().base_tickets -= actually_moved;
        self.pool.get_mut(from_idx).unwrap().current_tickets -= actually_moved;
        self.pool.get_mut(to_idx).unwrap().base_tickets += actually_moved;
        self.pool.get_mut(to_idx).unwrap().current_tickets += actually_moved;
        true
    }

    /// Scale every process's current ticket count by `factor` — the
    /// inflation-control mechanism. A full recompute of `total_tickets`
    /// follows, since rounding per-entry would otherwise drift.
    pub fn inflate(&mut self, factor: f64) {
        let mut cursor = self.head;
        while cursor != NONE {
            let entry = self.pool.get_mut(cursor).unwrap();
            let scaled = (entry.base_tickets as f64 * factor).round().max(1.0) as u32;
            entry.current_tickets = clamp(scaled, crate::config::LOTTERY_MIN_TICKETS, crate::config::LOTTERY_MAX_TICKETS);
            cursor = entry.next;
        }
        self.recompute_total();
    }

    /// Credits (or clears) compensation tickets for a partial-quantum
    /// yield: `base * (1/f - 1)` where `f` is the fraction of the
    /// quantum actually used, clamped so a process can never be
    /// credited down to negative or unbounded tickets. `f >= 1.0`
    /// (ran the full slice) clears compensation back to zero.
    pub fn credit_compensation(&mut self, pid: Pid, fraction_used: f64) {
        let Some(idx) = self.find(pid) else { return };
        let old = {
            let e = self.pool.get(idx).unwrap();
            (e.current_tickets + e.compensation) as u64
        };
        let entry = self.pool.get_mut(idx).unwrap();
        entry.compensation = if fraction_used >= 1.0 || fraction_used <= 0.0 {
            0
        } else {
            let bonus = entry.base_tickets as f64 * (1.0 / fraction_used - 1.0);
            clamp(bonus.round().max(0.0) as u32, 0, crate::config::LOTTERY_MAX_TICKETS)
        };
        let new = (entry.current_tickets + entry.compensation) as u64;
        self.total_tickets = self.total_tickets - old + new;
    }

    fn recompute_total(&mut self) {
        let mut total = 0u64;
        let mut cursor = self.head;
        while cursor != NONE {
            let entry = self.pool.get(cursor).unwrap();
            total += (entry.current_tickets + entry.compensation) as u64;
            cursor = entry.next;
        }
        self.total_tickets = total;
    }

    /// Jain's fairness index over each process's ratio of observed win
    /// rate to its expected share of the ticket pool (spec.md §4.5):
    /// `ratio_i = (wins_i / draws) / ((current_tickets_i + compensation_i) / total_tickets)`.
    /// `1.0` is perfectly fair; lower values indicate skew. Reported as
    /// `1.0` with fewer than two participants or zero lotteries held,
    /// matching spec.md's stated fallback.
    pub fn jains_fairness_index(&self) -> f64 {
        if self.draws == 0 || self.count < 2 || self.total_tickets == 0 {
            return 1.0;
        }
        let total_draws = self.draws as f64;
        let total_tickets = self.total_tickets as f64;
        let mut sum = 0f64;
        let mut sum_sq = 0f64;
        let mut n = 0usize;
        let mut cursor = self.head;
        while cursor != NONE {
            let entry = self.pool.get(cursor).unwrap();
            let expected_share = (entry.current_tickets + entry.compensation) as f64 / total_tickets;
            let ratio = if expected_share > 0.0 {
                (entry.wins as f64 / total_draws) / expected_share
            } else {
                0.0
            };
            sum += ratio;
            sum_sq += ratio * ratio;
            n += 1;
            cursor = entry.next;
        }
        if n == 0 || sum_sq == 0.0 {
            return 1.0;
        }
        (sum * sum) / (n as f64 * sum_sq)
    }

    pub fn wins(&self, pid: Pid) -> u64 {
        self.find(pid).map(|idx| self.pool.get(idx).unwrap().wins).unwrap_or(0)
    }
}

impl Policy for Lottery {
    fn name(&self) -> &'static str {
        "lottery"
    }

    fn policy_type(&self) -> PolicyType {
        PolicyType::Lottery
    }

    fn pick_next(&self) -> Pid {
        self.pool.get(self.current_winner).map(|e| e.pid).unwrap_or(NO_PID)
    }

    fn schedule(&mut self) -> ScheduleDecision {
        self.schedule_calls += 1;
        let winner = self.draw_winner();
        self.current_winner = winner;
        if let Some(entry) = self.pool.get_mut(winner) {
            entry.wins += 1;
        }
        ScheduleDecision {
            next: self.pick_next(),
            switched: false,
        }
    }

    fn enqueue(&mut self, pid: Pid, priority: i32) -> bool {
        // `priority` has no meaning in ticket-space for this policy —
        // tickets are assigned via `set_priority`/`transfer`, not at
        // enqueue time (spec.md §4.5).
        let _ = priority;
        let tickets = crate::config::LOTTERY_DEFAULT_TICKETS;
        let idx = match self.pool.alloc(LotteryEntry {
            pid,
            base_tickets: tickets,
            current_tickets: tickets,
            compensation: 0,
            wins: 0,
            next: NONE,
        }) {
            Some(idx) => idx,
            None => {
                debug!(pid, "lottery pool exhausted — enqueue dropped");
                return true;
            }
        };
        self.pool.get_mut(idx).unwrap().next = self.head;
        self.head = idx;
        self.count += 1;
        self.total_tickets += tickets as u64;
        true
    }

    fn dequeue(&mut self, pid: Pid) -> bool {
        let idx = match self.find(pid) {
            Some(idx) => idx,
            None => return true,
        };
        let tickets = {
            let e = self.pool.get(idx).unwrap();
            (e.current_tickets + e.compensation) as u64
        };

        if self.head == idx {
            self.head = self.pool.get(idx).unwrap().next;
        } else {
            let mut cursor = self.head;
            while cursor != NONE {
                let next = self.pool.get(cursor).unwrap().next;
                if next == idx {
                    let after = self.pool.get(idx).unwrap().next;
                    self.pool.get_mut(cursor).unwrap().next = after;
                    break;
                }
                cursor = next;
            }
        }
        self.pool.free(idx);
        self.count -= 1;
        self.total_tickets = self.total_tickets.saturating_sub(tickets);
        if self.current_winner == idx {
            self.current_winner = NONE;
        }
        true
    }

    /// Sets the base (and current) ticket count, clamped to
    /// [LOTTERY_MIN_TICKETS, LOTTERY_MAX_TICKETS].
    fn set_priority(&mut self, pid: Pid, priority: i32) -> Option<bool> {
        let idx = self.find(pid)?;
        let new_tickets = clamp(
            priority.max(0) as u32,
            crate::config::LOTTERY_MIN_TICKETS,
            crate::config::LOTTERY_MAX_TICKETS,
        );
        let old = {
            let e = self.pool.get(idx).unwrap();
            (e.current_tickets + e.compensation) as u64
        };
        let entry = self.pool.get_mut(idx).unwrap();
        entry.base_tickets = new_tickets;
        entry.current_tickets = new_tickets;
        let new = (new_tickets + entry.compensation) as u64;
        self.total_tickets = self.total_tickets - old + new;
        Some(true)
    }

    /// Effective ticket count (`current_tickets + compensation`) —
    /// what actually determines this process's odds in the next draw.
    fn get_priority(&self, pid: Pid) -> Option<i32> {
        self.find(pid)
            .map(|idx| (self.pool.get(idx).unwrap().current_tickets + self.pool.get(idx).unwrap().compensation) as i32)
    }

    /// Ends the current winner's run. Compensation tickets for a
    /// partial-quantum yield are credited separately through
    /// [`Lottery::credit_compensation`], which the framework calls with
    /// the fraction of the quantum actually consumed before handing
    /// control back here.
    fn yield_now(&mut self) -> bool {
        self.current_winner = NONE;
        true
    }

    fn get_stats(&self) -> PolicyStats {
        let mut extra = std::collections::HashMap::new();
        extra.insert("total_tickets".to_string(), self.total_tickets as f64);
        extra.insert("draws".to_string(), self.draws as f64);
        extra.insert("jains_fairness_index".to_string(), self.jains_fairness_index());
        PolicyStats {
            ready_count: self.count,
            schedule_calls: self.schedule_calls,
            extra,
        }
    }

    fn reset_stats(&mut self) {
        self.schedule_calls = 0;
        self.draws = 0;
        let mut cursor = self.head;
        while cursor != NONE {
            let entry = self.pool.get_mut(cursor).unwrap();
            entry.wins = 0;
            cursor = entry.next;
        }
    }

    fn print_stats(&self) -> String {
        format!(
            "Lottery: count={} total_tickets={} draws={} jain={:.3}",
            self.count,
            self.total_tickets,
            self.draws,
            self.jains_fairness_index()
        )
    }

    fn validate(&self) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        let mut cursor = self.head;
        let mut steps = 0usize;
        let mut recomputed = 0u64;
        while cursor != NONE {
            let entry = self.pool.get(cursor).unwrap();
            if entry.base_tickets < crate::config::LOTTERY_MIN_TICKETS || entry.base_tickets > crate::config::LOTTERY_MAX_TICKETS {
                findings.push(ValidationFinding::Other {
                    detail: format!("pid {}: base_tickets {} out of range", entry.pid, entry.base_tickets),
                });
            }
            recomputed += (entry.current_tickets + entry.compensation) as u64;
            cursor = entry.next;
            steps += 1;
        }
        if steps != self.count {
            findings.push(ValidationFinding::CountMismatch {
                counted: steps,
                tracked: self.count,
            });
        }
        if recomputed != self.total_tickets {
            findings.push(ValidationFinding::Other {
                detail: format!("cached total_tickets {} != recomputed {recomputed}", self.total_tickets),
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
        let _ = writeln!(out, "Lottery: count={} total_tickets={}", self.count, self.total_tickets);
        let mut cursor = self.head;
        while cursor != NONE {
            let entry = self.pool.get(cursor).unwrap();
            let _ = writeln!(
                out,
                "  pid={} tickets={} compensation={} wins={}",
                entry.pid, entry.current_tickets, entry.compensation, entry.wins
            );
            cursor = entry.next;
        }
        out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcg_is_deterministic_for_a_fixed_seed() {
        let mut a = Lcg::new(42);
        let mut b = Lcg::new(42);
        for _ in 0..50 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn lcg_different_seeds_diverge() {
        let mut a = Lcg::new(1);
        let mut b = Lcg::new(2);
        let seq_a: Vec<u32> = (0..10).map(|_| a.next_u32()).collect();
        let seq_b: Vec<u32> = (0..10).map(|_| b.next_u32()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn enqueue_dequeue_round_trip_restores_empty_state() {
        let mut l = Lottery::new(8);
        l.enqueue(1, 0);
        l.dequeue(1);
        assert_eq!(l.count, 0);
        assert_eq!(l.total_tickets, 0);
        assert!(l.validate().is_empty());
    }

    #[test]
    fn set_priority_updates_tickets_and_total() {
        let mut l = Lottery::new(8);
        l.enqueue(1, 0);
        l.set_priority(1, 500);
        assert_eq!(l.get_priority(1), Some(500));
        assert_eq!(l.total_tickets, 500);
    }

    #[test]
    fn transfer_moves_tickets_between_processes() {
        let mut l = Lottery::new(8);
        l.enqueue(1, 0);
        l.enqueue(2, 0);
        l.set_priority(1, 200);
        assert!(l.transfer(1, 2, 50));
        assert_eq!(l.get_priority(1), Some(150));
        assert_eq!(l.get_priority(2), Some(150));
    }

    #[test]
    fn transfer_respects_minimum_ticket_floor() {
        let mut l = Lottery::new(8);
        l.enqueue(1, 0);
        l.enqueue(2, 0);
        l.set_priority(1, 1);
        assert!(!l.transfer(1, 2, 10));
    }

    #[test]
    fn ticket_share_tracks_win_proportion_over_many_draws() {
        // spec.md §8 scenario 4: two processes, one with 4x the
        // tickets of the other, should win roughly 4x as often.
        let mut l = Lottery::with_seed(8, 7);
        l.enqueue(1, 0);
        l.enqueue(2, 0);
        l.set_priority(1, 800);
        l.set_priority(2, 200);

        for _ in 0..10_000 {
            l.schedule();
        }

        let w1 = l.wins(1) as f64;
        let w2 = l.wins(2) as f64;
        let ratio = w1 / w2;
        assert!((ratio - 4.0).abs() < 0.4, "expected ~4.0 win ratio, got {ratio}");

        // Jain's index is over win-rate/expected-share ratios, not raw
        // win counts, so a lopsided-but-proportional split like this
        // one still reads as fair.
        let index = l.jains_fairness_index();
        assert!(index >= 0.95, "expected a fair index despite unequal tickets, got {index}");
    }

    #[test]
    fn equal_tickets_yield_high_fairness_index() {
        let mut l = Lottery::with_seed(8, 99);
        l.enqueue(1, 0);
        l.enqueue(2, 0);
        l.enqueue(3, 0);
        for _ in 0..10_000 {
            l.schedule();
        }
        assert!(l.jains_fairness_index() >= 0.95);
    }

    #[test]
    fn inflate_scales_current_tickets_and_keeps_total_consistent() {
        let mut l = Lottery::new(8);
        l.enqueue(1, 0);
        l.inflate(2.0);
        assert!(l.validate().is_empty());
    }

    #[test]
    fn partial_quantum_yield_credits_compensation_tickets() {
        let mut l = Lottery::new(8);
        l.enqueue(1, 0);
        l.credit_compensation(1, 0.5);
        assert!(l.get_priority(1).unwrap() > 100, "compensation should raise effective tickets");
        assert!(l.validate().is_empty());
        l.credit_compensation(1, 1.0);
        assert_eq!(l.get_priority(1), Some(100), "full-slice run clears compensation");
    }

    #[test]
    fn dequeue_nonmember_is_noop() {
        let mut l = Lottery::new(8);
        assert!(l.dequeue(42));
    }
}
