/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Compile-time tunables (spec.md §6) and an optional runtime override
//! layer.
//!
//! Every constant below is the documented default. A host that wants to
//! override them without recompiling loads a [`SchedulerConfig`] from a
//! YAML file; fields absent from the file keep the compiled-in default.
//! This mirrors `timpani-o::config::NodeConfigManager::load_from_file` —
//! same fallback-to-default behaviour, same `anyhow` error wrapping,
//! same `tracing` logging of what was loaded.
//!
//! ```yaml
//! default_quantum: 10
//! mlfq_boost_interval: 1000
//! lottery_default_tickets: 100
//! cfs_target_latency: 20
//! rt_max_tasks: 64
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

// ── Compile-time defaults (spec.md §6) ─────────────────────────────────────

/// Upper bound on pids and per-policy node pool size.
pub const NPROC: usize = 64;

/// Initial quantum for RR/generic ready queues, clamped to [1, 1000].
pub const DEFAULT_QUANTUM: u32 = 10;

/// Semantic priority bands (spec.md §4.3, §4.4).
pub const PRIORITY_MIN: i32 = 0;
pub const PRIORITY_LOW: i32 = 25;
pub const PRIORITY_MID: i32 = 50;
pub const PRIORITY_HIGH: i32 = 75;
pub const PRIORITY_MAX: i32 = 99;

/// Priority aging (spec.md §4.3).
pub const AGING_INTERVAL: u64 = 100;
pub const AGING_AMOUNT: i32 = 1;
pub const STARVATION_THRESHOLD: u64 = 1000;
pub const STARVATION_BOOST: i32 = 10;

/// MLFQ tunables (spec.md §4.4, §6).
pub const MLFQ_NUM_LEVELS: usize = 8;
pub const MLFQ_BOOST_INTERVAL: u64 = 1000;
pub const MLFQ_IO_BONUS_LEVELS: i32 = 2;
pub const MLFQ_IO_THRESHOLD: u32 = 3;

/// Lottery tunables (spec.md §4.5, §6).
pub const LOTTERY_DEFAULT_TICKETS: u32 = 100;
pub const LOTTERY_MIN_TICKETS: u32 = 1;
pub const LOTTERY_MAX_TICKETS: u32 = 10_000;

/// CFS tunables (spec.md §4.6, §6).
pub const CFS_TARGET_LATENCY: u64 = 20;
pub const CFS_MIN_GRANULARITY: u64 = 4;
pub const CFS_WEIGHT_NICE0: u32 = 1024;

/// Real-time tunables (spec.md §4.7, §6).
pub const RT_MAX_TASKS: usize = 64;
pub const RT_DEFAULT_PERIOD: u64 = 100;
pub const RT_DEFAULT_DEADLINE: u64 = 100;
pub const RT_DEFAULT_WCET: u64 = 10;

/// Clamp helper shared by every policy that clamps a tunable into a
/// documented range (quantum, priority, tickets, ...).
pub fn clamp<T: PartialOrd>(value: T, lo: T, hi: T) -> T {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

// ── Runtime override layer ─────────────────────────────────────────────────

/// Runtime-overridable subset of the tunables above.
///
/// Every field is optional; a value absent from the YAML file keeps the
/// compiled-in default from this module. Mirrors the partial-config
/// acceptance of `timpani-o::config::NodeConfigEntry`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    pub default_quantum: Option<u32>,
    pub aging_interval: Option<u64>,
    pub aging_amount: Option<i32>,
    pub starvation_threshold: Option<u64>,
    pub starvation_boost: Option<i32>,
    pub mlfq_boost_interval: Option<u64>,
    pub mlfq_io_bonus_levels: Option<i32>,
    pub lottery_default_tickets: Option<u32>,
    pub cfs_target_latency: Option<u64>,
    pub cfs_min_granularity: Option<u64>,
    pub rt_max_tasks: Option<usize>,
}

impl SchedulerConfig {
    /// Returns a config with every field at its compiled-in default.
    pub fn defaults() -> Self {
        Self::default()
    }

    /// Parses `path` and returns a [`SchedulerConfig`] with fields
    /// present in the file overriding the compiled-in defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or is not valid
    /// YAML. A syntactically valid but empty file yields all-default
    /// fields, matching `NodeConfigManager`'s partial-config tolerance.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let cfg: SchedulerConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        info!(?cfg, "scheduler configuration loaded");
        Ok(cfg)
    }

    pub fn default_quantum(&self) -> u32 {
        clamp(self.default_quantum.unwrap_or(DEFAULT_QUANTUM), 1, 1000)
    }

    pub fn aging_interval(&self) -> u64 {
        self.aging_interval.unwrap_or(AGING_INTERVAL).max(1)
    }

    pub fn aging_amount(&self) -> i32 {
        self.aging_amount.unwrap_or(AGING_AMOUNT)
    }

    pub fn starvation_threshold(&self) -> u64 {
        self.starvation_threshold.unwrap_or(STARVATION_THRESHOLD)
    }

    pub fn starvation_boost(&self) -> i32 {
        self.starvation_boost.unwrap_or(STARVATION_BOOST)
    }

    pub fn mlfq_boost_interval(&self) -> u64 {
        self.mlfq_boost_interval.unwrap_or(MLFQ_BOOST_INTERVAL)
    }

    pub fn mlfq_io_bonus_levels(&self) -> i32 {
        self.mlfq_io_bonus_levels.unwrap_or(MLFQ_IO_BONUS_LEVELS)
    }

    pub fn lottery_default_tickets(&self) -> u32 {
        clamp(
            self.lottery_default_tickets.unwrap_or(LOTTERY_DEFAULT_TICKETS),
            LOTTERY_MIN_TICKETS,
            LOTTERY_MAX_TICKETS,
        )
    }

    pub fn cfs_target_latency(&self) -> u64 {
        self.cfs_target_latency.unwrap_or(CFS_TARGET_LATENCY)
    }

    pub fn cfs_min_granularity(&self) -> u64 {
        self.cfs_min_granularity.unwrap_or(CFS_MIN_GRANULARITY).max(1)
    }

    pub fn rt_max_tasks(&self) -> usize {
        self.rt_max_tasks.unwrap_or(RT_MAX_TASKS)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = SchedulerConfig::defaults();
        assert_eq!(cfg.default_quantum(), DEFAULT_QUANTUM);
        assert_eq!(cfg.mlfq_boost_interval(), MLFQ_BOOST_INTERVAL);
        assert_eq!(cfg.lottery_default_tickets(), LOTTERY_DEFAULT_TICKETS);
        assert_eq!(cfg.rt_max_tasks(), RT_MAX_TASKS);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let f = yaml_tempfile("default_quantum: 25\n");
        let cfg = SchedulerConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.default_quantum(), 25);
        // Untouched fields keep their compiled-in default.
        assert_eq!(cfg.mlfq_boost_interval(), MLFQ_BOOST_INTERVAL);
    }

    #[test]
    fn quantum_override_is_clamped() {
        let f = yaml_tempfile("default_quantum: 99999\n");
        let cfg = SchedulerConfig::load_from_file(f.path()).unwrap();
        assert_eq!(cfg.default_quantum(), 1000);
    }

    #[test]
    fn missing_file_returns_error() {
        let result = SchedulerConfig::load_from_file(Path::new("/nonexistent/sched.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("default_quantum: [this, is, not, a, number]\n");
        assert!(SchedulerConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn clamp_helper_respects_bounds() {
        assert_eq!(clamp(5, 0, 10), 5);
        assert_eq!(clamp(-5, 0, 10), 0);
        assert_eq!(clamp(15, 0, 10), 10);
    }
}
