/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end scenarios driven through the public [`SchedulerFramework`]
//! API, one per policy family. Each mirrors a scenario already
//! hand-traced at the per-policy unit-test level, but exercised here
//! through `sched_new_process`/`sched_tick`/`schedule` so a regression
//! in the framework's dispatch plumbing (not just the policy's own
//! internals) would also be caught.

use sched_core::framework::SchedulerFramework;
use sched_core::policies::lottery::Lottery;
use sched_core::policies::realtime::{MissPolicy, RealTime, RtAlgorithm, RtParams};
use sched_core::policy::{Policy, PolicyType};
use sched_core::process::{LoggingContextSwitch, SimpleProcessTable};

fn fresh_framework(policy_type: PolicyType, capacity: usize) -> SchedulerFramework {
    SchedulerFramework::new(
        policy_type,
        capacity,
        Box::new(SimpleProcessTable::new()),
        Box::new(LoggingContextSwitch::default()),
    )
}

#[test]
fn round_robin_rotates_three_processes_at_quantum_ten() {
    let mut fw = fresh_framework(PolicyType::RoundRobin, 8);
    fw.scheduler_init();
    fw.sched_set_quantum(10);
    fw.sched_new_process(1, 0);
    fw.sched_new_process(2, 0);
    fw.sched_new_process(3, 0);

    assert_eq!(fw.schedule(), 1);
    for _ in 0..10 {
        fw.sched_tick();
    }
    assert_eq!(fw.running(), 2);
    for _ in 0..10 {
        fw.sched_tick();
    }
    assert_eq!(fw.running(), 3);

    // One dispatch up front plus two rotations.
    assert_eq!(fw.sched_get_stats().context_switches, 3);
}

#[test]
fn setpriority_through_the_framework_triggers_a_resched_when_it_changes_who_runs() {
    // `getpriority` mirrors the process table, not a policy's internal
    // aging/demotion state (those only move through `Policy::tick`),
    // so the framework-level contract worth pinning here is that an
    // explicit priority change which flips the ready-set's head also
    // flips who the scheduler dispatches next. The aging scenario
    // itself (spec.md §8 scenario 2) is exercised directly against
    // `Priority::with_tunables` in `policies::priority`'s own tests,
    // where the interval/amount can be tuned to converge in fewer
    // iterations than the framework's fixed defaults allow.
    let mut fw = fresh_framework(PolicyType::Priority, 8);
    fw.scheduler_init();
    fw.sched_new_process(1, 10);
    fw.sched_new_process(2, 90);
    assert_eq!(fw.schedule(), 2);

    fw.setpriority(1, 95).unwrap();
    assert_eq!(fw.resched(), 1);
}

#[test]
fn mlfq_demotion_hands_the_cpu_to_a_process_waiting_at_a_lower_level() {
    // pid 1 @ 90 starts at level 0 (quantum 2, allotment 4); pid 2 @ 60
    // starts at level 2 and never runs while pid 1 occupies a lower
    // level. Tracing `Mlfq::tick`'s own quantum/allotment bookkeeping:
    // level 0 exhausts its allotment after 4 ticks (demote to level 1,
    // quantum 4, allotment 8), and level 1 exhausts its allotment 8
    // ticks later (tick 12), demoting pid 1 into level 2 behind pid 2,
    // which has been sitting at that level's head the whole time.
    // `getpriority` again only reflects the process table, so the
    // observable effect checked here is which pid the framework hands
    // the CPU to, not a priority/level number.
    let mut fw = fresh_framework(PolicyType::Mlfq, 8);
    fw.scheduler_init();
    fw.sched_new_process(1, 90); // level 0
    fw.sched_new_process(2, 60); // level 2
    assert_eq!(fw.schedule(), 1);

    for _ in 0..12 {
        fw.sched_tick();
    }

    assert_eq!(fw.running(), 2);
}

#[test]
fn lottery_ticket_ratio_tracks_win_ratio_over_many_draws() {
    // spec.md §8 scenario 4, checked directly against the policy since
    // ticket assignment happens through `set_priority`, which the
    // framework exposes, but the 10,000-draw statistical check is
    // clearer against the policy's own `wins`/`jains_fairness_index`
    // accessors than by threading it through GlobalStats.
    let mut lottery = Lottery::with_seed(8, 7);
    lottery.enqueue(1, 0);
    lottery.enqueue(2, 0);
    lottery.set_priority(1, 800);
    lottery.set_priority(2, 200);

    for _ in 0..10_000 {
        lottery.schedule();
    }

    let ratio = lottery.wins(1) as f64 / lottery.wins(2) as f64;
    assert!((ratio - 4.0).abs() < 0.4, "expected ~4:1 win ratio, got {ratio}");
}

#[test]
fn cfs_splits_cpu_share_evenly_between_equal_nice_processes() {
    let mut fw = fresh_framework(PolicyType::Cfs, 8);
    fw.scheduler_init();
    fw.sched_new_process(1, 0);
    fw.sched_new_process(2, 0);

    for _ in 0..2000 {
        fw.schedule();
        fw.sched_tick();
    }

    let e1 = fw.sched_get_proc_stats(1).ticks_run as f64;
    let e2 = fw.sched_get_proc_stats(2).ticks_run as f64;
    let ratio = e1 / e2;
    assert!((ratio - 1.0).abs() < 0.15, "expected a roughly even split, got {ratio}");
}

#[test]
fn edf_meets_every_deadline_until_utilization_crosses_one() {
    // spec.md §8 scenario 6: a task set comfortably under 1.0
    // utilization meets every deadline; pushing wcet up past 1.0 starts
    // missing them under NOTIFY. `schedule()` must be called every tick
    // so `current` tracks whichever task EDF now prefers — `tick()`
    // only charges whoever `schedule()` last selected.
    let mut rt = RealTime::new(8, RtAlgorithm::Edf);
    rt.admit(1, RtParams { period: 20, deadline: 20, wcet: 5, phase: 0, miss_policy: MissPolicy::Notify });
    rt.admit(2, RtParams { period: 20, deadline: 20, wcet: 5, phase: 0, miss_policy: MissPolicy::Notify });
    assert!(rt.is_schedulable());
    for _ in 0..200 {
        rt.schedule();
        rt.tick();
    }
    assert_eq!(rt.deadline_misses_of(1).unwrap(), 0);
    assert_eq!(rt.deadline_misses_of(2).unwrap(), 0);

    let mut overloaded = RealTime::new(8, RtAlgorithm::Edf);
    overloaded.admit(1, RtParams { period: 20, deadline: 20, wcet: 15, phase: 0, miss_policy: MissPolicy::Notify });
    overloaded.admit(2, RtParams { period: 20, deadline: 20, wcet: 15, phase: 0, miss_policy: MissPolicy::Notify });
    assert!(!overloaded.is_schedulable());
    for _ in 0..200 {
        overloaded.schedule();
        overloaded.tick();
    }
    let misses = overloaded.deadline_misses_of(1).unwrap() + overloaded.deadline_misses_of(2).unwrap();
    assert!(misses > 0, "overloaded task set should miss at least one deadline");
}

#[test]
fn scheduler_switch_preserves_cumulative_stats_across_policies() {
    let mut fw = fresh_framework(PolicyType::RoundRobin, 8);
    fw.scheduler_init();
    fw.sched_new_process(1, 50);
    fw.schedule();
    for _ in 0..5 {
        fw.sched_tick();
    }
    let ticks_before = fw.sched_get_stats().ticks;

    fw.scheduler_switch(PolicyType::Cfs);
    assert_eq!(fw.policy_type(), PolicyType::Cfs);
    assert_eq!(fw.sched_get_stats().ticks, ticks_before);
    assert_eq!(fw.sched_get_stats().policy_switches, 1);

    // The new policy starts with an empty ready queue; re-admission is
    // the caller's job (spec.md §7: a switch resets scheduling state).
    fw.sched_new_process(1, 0);
    assert_eq!(fw.schedule(), 1);
}

#[test]
fn blocked_process_is_removed_from_the_ready_set_and_resumes_on_wakeup() {
    let mut fw = fresh_framework(PolicyType::RoundRobin, 8);
    fw.scheduler_init();
    fw.sched_new_process(1, 0);
    fw.sched_new_process(2, 0);
    fw.schedule();
    assert_eq!(fw.running(), 1);

    fw.sched_block(1);
    assert_eq!(fw.resched(), 2);

    fw.sched_wakeup(1);
    fw.sched_block(2);
    assert_eq!(fw.resched(), 1);
}

#[test]
fn sched_validate_reports_healthy_state_across_every_policy() {
    for pt in [
        PolicyType::RoundRobin,
        PolicyType::Priority,
        PolicyType::Mlfq,
        PolicyType::Lottery,
        PolicyType::Cfs,
        PolicyType::RealTime,
    ] {
        let mut fw = fresh_framework(pt, 8);
        fw.scheduler_init();
        fw.sched_new_process(1, 50);
        fw.sched_new_process(2, 50);
        for _ in 0..20 {
            fw.sched_tick();
        }
        assert!(fw.sched_validate(), "{pt:?} reported validation findings");
    }
}
