// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

use crate::error::ThreadError;
use crate::scheduler::{self, with_scheduler};

/// A lock identifier in `[0, NUM_LOCKS)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockId(pub usize);

/// A condition identifier in `[0, CONDITIONS_PER_LOCK)`, scoped to one lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CondId(pub usize);

/// A condition's sticky single-slot signal latch. A signal with no waiter
/// present sets it `Pending`; the next `wait` on that condition consumes
/// it without blocking. A signal while already `Pending` is a no-op.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Latch {
    Pending,
    Clear,
}

pub(crate) struct LockRecord {
    pub available: bool,
    pub conditions: Vec<Latch>,
}

impl LockRecord {
    pub(crate) fn new(conditions_per_lock: usize) -> LockRecord {
        LockRecord {
            available: true,
            conditions: vec![Latch::Clear; conditions_per_lock],
        }
    }
}

/// Assumes the preemption gate is already disabled (every caller here
/// disables it before touching the scheduler at all) and validates
/// entirely through `with_scheduler`, so the gate stays down for its
/// whole duration rather than being set only around the final check.
fn validate_lock(l: LockId) -> Result<(), ThreadError> {
    let num_locks = with_scheduler(|s| s.locks.len());
    if l.0 >= num_locks {
        return Err(ThreadError::InvalidLock(l.0));
    }
    Ok(())
}

fn validate_condition(l: LockId, c: CondId) -> Result<(), ThreadError> {
    validate_lock(l)?;
    let conditions_per_lock = with_scheduler(|s| s.locks[l.0].conditions.len());
    if c.0 >= conditions_per_lock {
        return Err(ThreadError::InvalidCondition(l.0, c.0));
    }
    Ok(())
}

/// `_myLock` from the reference design: the acquisition loop itself,
/// gate-agnostic. Assumes the preemption gate is already disabled on
/// entry and leaves it disabled on return — every `with_scheduler` touch
/// in the loop body runs under it, and `yield_now`'s own re-enable is
/// undone immediately so the caller's critical section stays intact.
fn raw_lock(current: crate::tcb::ThreadId, l: usize) {
    loop {
        let must_block = with_scheduler(|s| s.begin_lock(current, l));
        if !must_block {
            break;
        }
        scheduler::yield_now();
        crate::preempt::disable();
    }
}

/// `_myUnlock`: gate-agnostic, assumes the caller already holds the gate
/// disabled and leaves it disabled.
fn raw_unlock(l: usize) {
    with_scheduler(|s| s.end_unlock(l));
}

/// Acquires `l`, blocking (by yielding) while it is held. FIFO among
/// threads blocked on the same lock: see `unlock`.
pub fn lock(l: LockId) -> Result<(), ThreadError> {
    crate::preempt::disable();
    let result = (|| {
        validate_lock(l)?;
        let current = scheduler::current_tid();
        raw_lock(current, l.0);
        Ok(())
    })();
    crate::preempt::enable();
    result
}

/// Releases `l`. Wakes the longest-waiting pure lock-waiter if any;
/// otherwise wakes a condition-waiter whose latch is already pending,
/// since that thread will simply re-acquire the lock on resume.
pub fn unlock(l: LockId) -> Result<(), ThreadError> {
    crate::preempt::disable();
    let result = (|| {
        validate_lock(l)?;
        raw_unlock(l.0);
        Ok(())
    })();
    crate::preempt::enable();
    result
}

/// Acquires `l`, then blocks until `(l, c)` is signaled — or returns
/// immediately if a prior `signal` already left the latch pending — and
/// returns with `l` released.
pub fn wait(l: LockId, c: CondId) -> Result<(), ThreadError> {
    crate::preempt::disable();
    let result = (|| {
        validate_condition(l, c)?;
        let current = scheduler::current_tid();
        raw_lock(current, l.0);
        loop {
            let pending = with_scheduler(|s| s.locks[l.0].conditions[c.0] == Latch::Pending);
            if pending {
                break;
            }
            with_scheduler(|s| s.begin_wait(current, l.0, c.0));
            // Release the lock only after parking on condition-wait, so a
            // signal racing with this call still finds the waiter present.
            raw_unlock(l.0);
            scheduler::yield_now();
            crate::preempt::disable();
            raw_lock(current, l.0);
        }
        with_scheduler(|s| s.locks[l.0].conditions[c.0] = Latch::Clear);
        raw_unlock(l.0);
        Ok(())
    })();
    crate::preempt::enable();
    result
}

/// Wakes at most one waiter on `(l, c)`. Safe to call whether or not a
/// waiter currently exists: an unmatched signal is remembered until the
/// next matching `wait`.
pub fn signal(l: LockId, c: CondId) -> Result<(), ThreadError> {
    crate::preempt::disable();
    let result = (|| {
        validate_condition(l, c)?;
        let current = scheduler::current_tid();
        raw_lock(current, l.0);
        with_scheduler(|s| s.do_signal(l.0, c.0));
        raw_unlock(l.0);
        Ok(())
    })();
    crate::preempt::enable();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{create, reset_for_test, TEST_LOCK};
    use crate::Config;

    fn tiny_config() -> Config {
        Config {
            num_locks: 2,
            conditions_per_lock: 2,
            stack_size: 64 * 1024,
        }
    }

    #[test]
    fn invalid_lock_is_rejected() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        assert_eq!(lock(LockId(99)), Err(ThreadError::InvalidLock(99)));
    }

    #[test]
    fn invalid_condition_is_rejected() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        assert_eq!(
            wait(LockId(0), CondId(99)),
            Err(ThreadError::InvalidCondition(0, 99))
        );
    }

    #[test]
    fn sticky_signal_before_wait_does_not_block() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        signal(LockId(0), CondId(0)).unwrap();
        let observed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed2 = observed.clone();
        create(move || {
            wait(LockId(0), CondId(0)).unwrap();
            observed2.store(true, std::sync::atomic::Ordering::SeqCst);
            Box::new(())
        });
        scheduler::yield_now();
        assert!(observed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
