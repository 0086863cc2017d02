// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, Once};

use crate::arch::{self, Context, Stack};
use crate::config::Config;
use crate::sync::{Latch, LockRecord};
use crate::tcb::{Entry, Tcb, ThreadId, ThreadResult};

/// The four queues a TCB can reside in.
pub(crate) struct Scheduler {
    pub(crate) arena: HashMap<ThreadId, Tcb>,
    pub(crate) ready: crate::queue::Queue,
    pub(crate) lock_wait: crate::queue::Queue,
    pub(crate) condition_wait: crate::queue::Queue,
    pub(crate) exit: crate::queue::Queue,
    pub(crate) locks: Vec<LockRecord>,
    next_tid: u64,
    /// The thread that just left the ready queue and should be treated as
    /// the outgoing side of the next `yield`, even though the ready
    /// cursor itself may have moved on. See `begin_exit`'s parent hint and
    /// `lock`/`wait`'s self-parking for the two ways this gets set.
    parked: Option<ThreadId>,
    /// The thread whose Rust call stack is presently executing. Kept
    /// explicit rather than inferred from `ready`'s cursor, since a
    /// thread that has just parked itself onto lock-wait or
    /// condition-wait is no longer a member of `ready` at all.
    current: ThreadId,
    stack_size: usize,
}

impl Scheduler {
    fn new(cfg: Config) -> Scheduler {
        Scheduler {
            arena: HashMap::new(),
            ready: crate::queue::Queue::new(),
            lock_wait: crate::queue::Queue::new(),
            condition_wait: crate::queue::Queue::new(),
            exit: crate::queue::Queue::new(),
            locks: (0..cfg.num_locks)
                .map(|_| LockRecord::new(cfg.conditions_per_lock))
                .collect(),
            next_tid: 1,
            parked: None,
            current: ThreadId::BOOTSTRAP,
            stack_size: cfg.stack_size,
        }
    }

    fn install_bootstrap(&mut self) {
        let bootstrap = Tcb {
            tid: ThreadId::BOOTSTRAP,
            context: Context::default(),
            stack: None,
            parent: None,
            lock_wait: None,
            condition_wait: None,
            result: None,
            entry: None,
            started: true,
        };
        self.arena.insert(ThreadId::BOOTSTRAP, bootstrap);
        self.ready.enqueue(ThreadId::BOOTSTRAP);
    }

    fn spawn(&mut self, f: impl FnOnce() -> ThreadResult + Send + 'static) -> ThreadId {
        let tid = ThreadId(self.next_tid);
        self.next_tid += 1;

        let mut stack = Stack::new(self.stack_size);
        let context = Context::new_child(&mut stack, trampoline);

        let tcb = Tcb {
            tid,
            context,
            stack: Some(stack),
            parent: Some(self.current),
            lock_wait: None,
            condition_wait: None,
            result: None,
            entry: Some(Box::new(f) as Entry),
            started: false,
        };
        self.arena.insert(tid, tcb);
        self.ready.enqueue(tid);
        tid
    }

    /// The central scheduling step. Returns the raw context pointers to
    /// swap between, or `None` if there is nothing else ready to run.
    fn prepare_yield(&mut self) -> Option<(*mut Context, *const Context)> {
        let outgoing = self.parked.take().unwrap_or(self.current);
        let incoming = self.ready.advance()?;
        if outgoing == incoming {
            return None;
        }

        if !self.arena[&incoming].started {
            self.arena.get_mut(&incoming).unwrap().started = true;
            START_TID.store(incoming.as_u64(), Ordering::Release);
        }
        self.current = incoming;

        let prev_ptr = &mut self.arena.get_mut(&outgoing).unwrap().context as *mut Context;
        let next_ptr = &self.arena[&incoming].context as *const Context;
        Some((prev_ptr, next_ptr))
    }

    /// `_lock`'s acquisition attempt. Returns `true` if the caller must
    /// park and yield before retrying, `false` once the lock is held.
    fn begin_lock(&mut self, current: ThreadId, l: usize) -> bool {
        if self.locks[l].available {
            self.locks[l].available = false;
            false
        } else {
            self.arena.get_mut(&current).unwrap().lock_wait = Some(l);
            self.parked = Some(current);
            let _ = crate::queue::transfer(&mut self.ready, &mut self.lock_wait, current);
            true
        }
    }

    /// `_unlock`: pure lock-waiters have priority over condition-waiters
    /// whose latch already happens to be pending.
    fn end_unlock(&mut self, l: usize) {
        self.locks[l].available = true;
        if let Some(tid) = self.find_by_lock(l) {
            self.arena.get_mut(&tid).unwrap().lock_wait = None;
            let _ = crate::queue::transfer(&mut self.lock_wait, &mut self.ready, tid);
            return;
        }
        if let Some(tid) = self.find_signaled(l) {
            let t = self.arena.get_mut(&tid).unwrap();
            t.lock_wait = None;
            t.condition_wait = None;
            let _ = crate::queue::transfer(&mut self.condition_wait, &mut self.ready, tid);
        }
    }

    /// Parks `current` onto condition-wait for `(l, c)`.
    fn begin_wait(&mut self, current: ThreadId, l: usize, c: usize) {
        let t = self.arena.get_mut(&current).unwrap();
        t.lock_wait = Some(l);
        t.condition_wait = Some(c);
        self.parked = Some(current);
        let _ = crate::queue::transfer(&mut self.ready, &mut self.condition_wait, current);
    }

    /// `signal`'s core: latch the condition, then wake the matching
    /// condition-waiter if one is parked.
    fn do_signal(&mut self, l: usize, c: usize) {
        if self.locks[l].conditions[c] == Latch::Clear {
            self.locks[l].conditions[c] = Latch::Pending;
            if let Some(tid) = self.find_by_condition(l, c) {
                let t = self.arena.get_mut(&tid).unwrap();
                t.lock_wait = None;
                t.condition_wait = None;
                let _ = crate::queue::transfer(&mut self.condition_wait, &mut self.ready, tid);
            }
        }
    }

    /// Pure lock-waiters only: a condition-waiter never sits in `lock_wait`.
    fn find_by_lock(&self, l: usize) -> Option<ThreadId> {
        self.lock_wait.iter().find(|tid| {
            let t = &self.arena[tid];
            t.lock_wait == Some(l) && t.condition_wait.is_none()
        })
    }

    /// Requires *both* `lock_wait` and `condition_wait` to match. The
    /// reference predicate terminated on a node matching either field
    /// (almost certainly a bug); this is the corrected, documented fix.
    fn find_by_condition(&self, l: usize, c: usize) -> Option<ThreadId> {
        self.condition_wait.iter().find(|tid| {
            let t = &self.arena[tid];
            t.lock_wait == Some(l) && t.condition_wait == Some(c)
        })
    }

    fn find_signaled(&self, l: usize) -> Option<ThreadId> {
        self.condition_wait.iter().find(|tid| {
            let t = &self.arena[tid];
            t.lock_wait == Some(l)
                && t.condition_wait
                    .is_some_and(|c| self.locks[l].conditions[c] == Latch::Pending)
        })
    }

    fn try_reap(&mut self, tid: ThreadId) -> Option<ThreadResult> {
        self.exit.find_by_tid(tid)?;
        self.exit.remove(tid);
        self.arena.remove(&tid).and_then(|tcb| tcb.result)
    }

    fn begin_exit(&mut self, result: ThreadResult) -> ExitAction {
        let me = self.current;
        self.ready.remove(me);

        if me == ThreadId::BOOTSTRAP {
            let code = *result.downcast::<i32>().unwrap_or_else(|_| {
                log::error!("bootstrap thread exited with a non-i32 result; using 0");
                Box::new(0)
            });
            return ExitAction::Terminate(code);
        }

        let parent = self.arena[&me]
            .parent
            .expect("non-bootstrap thread always has a parent");
        self.arena.get_mut(&me).unwrap().result = Some(result);
        self.exit.enqueue(me);

        // A scheduling hint toward the parent, per the reference design,
        // even though `current` is already the authoritative record.
        self.ready.set_cursor(parent);
        self.current = parent;

        let prev_ptr = &mut self.arena.get_mut(&me).unwrap().context as *mut Context;
        let next_ptr = &self.arena[&parent].context as *const Context;
        ExitAction::Swap(prev_ptr, next_ptr)
    }
}

enum ExitAction {
    Terminate(i32),
    Swap(*mut Context, *const Context),
}

static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);
static INIT: Once<()> = Once::new();
static START_TID: AtomicU64 = AtomicU64::new(0);

/// Locks and hands `f` the live `Scheduler`. Does **not** touch the
/// preemption gate itself — every caller must already have
/// `preempt::disable()`'d before its first call here, same as the
/// reference design's internal `_myLock`/`_myUnlock` assume
/// `interruptsAreDisabled` is already set. `spin::Mutex` is non-reentrant:
/// a signal-context `tick()` landing while this lock is held, with the
/// gate left clear, re-enters here and spins forever on the same thread.
pub(crate) fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&mut Scheduler) -> R,
{
    let mut guard = SCHEDULER.lock();
    let scheduler = guard
        .as_mut()
        .expect("cothread::init() must be called before any other operation");
    f(scheduler)
}

pub(crate) fn current_tid() -> ThreadId {
    with_scheduler(|s| s.current)
}

/// Idempotent; must be called before any other operation. Builds the four
/// queues, the bootstrap TCB (identifier 0), and a fully available lock
/// table using the compile-time defaults.
pub fn init() {
    init_with_config(Config::default())
}

/// As [`init`], but with an overridden [`Config`]. Later calls, with any
/// config, are silent no-ops — the scheduler this library models has
/// exactly one instance per process.
pub fn init_with_config(cfg: Config) {
    INIT.call_once(|| {
        let mut s = Scheduler::new(cfg);
        s.install_bootstrap();
        *SCHEDULER.lock() = Some(s);
        crate::preempt::enable();
    });
}

/// Spawns a new thread running `f`, then yields once so the new thread
/// gets a chance to run before the caller proceeds.
pub fn create<F>(f: F) -> ThreadId
where
    F: FnOnce() -> ThreadResult + Send + 'static,
{
    crate::preempt::disable();
    let tid = with_scheduler(|s| s.spawn(f));
    crate::preempt::enable();
    yield_now();
    tid
}

/// Gives another ready thread a chance to run; returns once this thread
/// is scheduled again.
pub fn yield_now() {
    crate::preempt::disable();
    let swap = with_scheduler(|s| s.prepare_yield());
    if let Some((prev, next)) = swap {
        unsafe { arch::switch(prev, next) };
    }
    crate::preempt::enable();
}

/// Blocks (by yielding) until `tid` has exited, then returns its result
/// and reclaims its TCB and stack.
pub fn join(tid: ThreadId) -> Result<ThreadResult, crate::error::ThreadError> {
    crate::preempt::disable();
    loop {
        if let Some(result) = with_scheduler(|s| s.try_reap(tid)) {
            crate::preempt::enable();
            return Ok(result);
        }
        if !with_scheduler(|s| s.arena.contains_key(&tid)) {
            crate::preempt::enable();
            return Err(crate::error::ThreadError::UnknownThread(tid));
        }
        // `yield_now` re-enables the gate on its way out, matching the
        // reference design's `threadJoin` clearing `interruptsAreDisabled`
        // around its own call to `threadYield`; restore it immediately on
        // return since this loop is still one continuous critical section.
        crate::preempt::enable();
        yield_now();
        crate::preempt::disable();
    }
}

/// Terminates the current thread. On the bootstrap thread this terminates
/// the process with the `i32` interpretation of `result`; otherwise the
/// result is stored for a future `join` and control passes directly to
/// the parent thread. Never returns.
pub fn exit(result: ThreadResult) -> ! {
    crate::preempt::disable();
    let action = with_scheduler(|s| s.begin_exit(result));
    match action {
        ExitAction::Terminate(code) => std::process::exit(code),
        ExitAction::Swap(prev, next) => {
            unsafe { arch::switch(prev, next) };
            unreachable!("an exited thread's context was resumed")
        }
    }
}

/// The first (and only) entry point for every freshly created thread's
/// context. Runs the closure that was stashed in its TCB, then exits
/// with the result — a user function is never allowed to "fall off the
/// end" without going through `exit`.
extern "C" fn trampoline() -> ! {
    let tid = ThreadId(START_TID.load(Ordering::Acquire));
    let entry = with_scheduler(|s| {
        s.arena
            .get_mut(&tid)
            .and_then(|tcb| tcb.entry.take())
            .expect("trampoline entered for a thread with no pending entry point")
    });
    crate::preempt::enable();
    let result = entry();
    exit(result)
}

#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Replaces the live scheduler wholesale, bypassing the production
/// `Once`. The library models exactly one scheduler per process, so
/// tests that want independent scenarios must serialize on
/// [`TEST_LOCK`] around this call.
#[cfg(test)]
pub(crate) fn reset_for_test(cfg: Config) {
    let mut s = Scheduler::new(cfg);
    s.install_bootstrap();
    *SCHEDULER.lock() = Some(s);
    crate::preempt::enable();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{lock, unlock, CondId, LockId};

    fn tiny_config() -> Config {
        Config {
            num_locks: 4,
            conditions_per_lock: 4,
            stack_size: 64 * 1024,
        }
    }

    #[test]
    fn bootstrap_thread_is_id_zero_and_ready() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        with_scheduler(|s| {
            assert!(s.ready.contains(ThreadId::BOOTSTRAP));
            assert_eq!(s.current, ThreadId::BOOTSTRAP);
        });
    }

    #[test]
    fn two_threads_alternate_round_robin() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let t1 = create(move || {
            for _ in 0..3 {
                o1.lock().unwrap().push(1);
                yield_now();
            }
            Box::new(())
        });
        let t2 = create(move || {
            for _ in 0..3 {
                o2.lock().unwrap().push(2);
                yield_now();
            }
            Box::new(())
        });
        join(t1).unwrap();
        join(t2).unwrap();
        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec![1, 2, 1, 2, 1, 2]);
    }

    #[test]
    fn join_returns_exit_value() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        let t = create(|| Box::new(42i32));
        let result = join(t).unwrap();
        assert_eq!(*result.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn join_after_exit_still_returns_value() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        let t = create(|| Box::new(7i32));
        // Give the child a full chance to run to completion before joining.
        for _ in 0..4 {
            yield_now();
        }
        let result = join(t).unwrap();
        assert_eq!(*result.downcast::<i32>().unwrap(), 7);
    }

    #[test]
    fn join_on_unknown_thread_errors() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        let bogus = ThreadId(12345);
        match join(bogus) {
            Err(crate::error::ThreadError::UnknownThread(tid)) => assert_eq!(tid, bogus),
            other => panic!("expected UnknownThread, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lock_mutual_exclusion_under_contention() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0));
        let c1 = counter.clone();
        let c2 = counter.clone();
        let t1 = create(move || {
            for _ in 0..1000 {
                lock(LockId(0)).unwrap();
                c1.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                yield_now();
                unlock(LockId(0)).unwrap();
            }
            Box::new(())
        });
        let t2 = create(move || {
            for _ in 0..1000 {
                lock(LockId(0)).unwrap();
                c2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                yield_now();
                unlock(LockId(0)).unwrap();
            }
            Box::new(())
        });
        join(t1).unwrap();
        join(t2).unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 2000);
    }

    #[test]
    fn wait_blocks_until_matching_signal() {
        let _g = TEST_LOCK.lock();
        reset_for_test(tiny_config());
        let woke = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let w = woke.clone();
        let waiter = create(move || {
            crate::sync::wait(LockId(0), CondId(0)).unwrap();
            w.store(true, std::sync::atomic::Ordering::SeqCst);
            Box::new(())
        });
        yield_now();
        assert!(!woke.load(std::sync::atomic::Ordering::SeqCst));
        crate::sync::signal(LockId(0), CondId(0)).unwrap();
        join(waiter).unwrap();
        assert!(woke.load(std::sync::atomic::Ordering::SeqCst));
    }
}
