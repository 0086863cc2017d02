// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

//! A cooperative user-space threading library: many logical threads
//! multiplexed onto a single OS thread via explicit context switching,
//! with a mutex/condition-variable engine and an optional preemption
//! gate for a driver-owned interval timer.
//!
//! The scheduler is a process-wide singleton, matching the single
//! executing flow the whole design assumes: there is no parallelism and
//! no kernel-visible thread beyond the process itself. [`init`] must run
//! before any other call; everything else is cooperative from there.

mod arch;
pub mod config;
pub mod error;
mod preempt;
mod queue;
mod scheduler;
mod sync;
mod tcb;

pub use config::Config;
pub use error::ThreadError;
pub use preempt::tick;
pub use scheduler::{create, exit, init, init_with_config, join, yield_now};
pub use sync::{lock, signal, unlock, wait, CondId, LockId};
pub use tcb::{ThreadId, ThreadResult};
