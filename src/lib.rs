/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! A pluggable single-CPU scheduling framework: round-robin, aging
//! priority, multi-level feedback queue, lottery, completely fair, and
//! real-time (EDF/RMS/DMS/LLF) policies behind one
//! [`policy::Policy`] contract, driven by [`framework::SchedulerFramework`].

pub mod config;
pub mod error;
pub mod framework;
pub mod hyperperiod;
pub mod policies;
pub mod policy;
pub mod pool;
pub mod process;
pub mod stats;
