// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

use std::sync::atomic::{AtomicBool, Ordering};

/// Gates whether a timer tick may invoke `yield_now`. Every public entry
/// point sets this on entry and clears it on exit, giving scheduler state
/// mutations a critical section with respect to a preempting timer
/// without needing a recursive lock.
static PREEMPT_DISABLED: AtomicBool = AtomicBool::new(true);

pub(crate) fn disable() {
    PREEMPT_DISABLED.store(true, Ordering::Release);
}

pub(crate) fn enable() {
    PREEMPT_DISABLED.store(false, Ordering::Release);
}

pub(crate) fn is_disabled() -> bool {
    PREEMPT_DISABLED.load(Ordering::Acquire)
}

/// Entry point for a driver's interval-timer handler. Ignored unless the
/// gate is clear, i.e. unless the caller is between library calls.
pub fn tick() {
    if !is_disabled() {
        crate::scheduler::yield_now();
    }
}
