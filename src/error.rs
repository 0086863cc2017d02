// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

use std::fmt;

use crate::tcb::ThreadId;

/// Errors the public API can report. The reference design left lock and
/// condition identifiers unvalidated; here they are checked at the
/// boundary and rejected with one of these instead of corrupting the
/// lock table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadError {
    InvalidLock(usize),
    InvalidCondition(usize, usize),
    /// `join` was called on an identifier the scheduler never assigned
    /// (or has already reclaimed via a prior `join`).
    UnknownThread(ThreadId),
    /// A queue transfer found its thread absent from the source queue.
    /// Logged at `error` level by `queue::transfer` and returned to its
    /// immediate caller; every scheduler call site discards it and
    /// presses on, since by the time this fires the scheduler's own
    /// bookkeeping is already wrong and there is no public operation left
    /// to fail cleanly. Kept as a variant (rather than a bare log line)
    /// so it is still observable, including by tests.
    QueueInvariantViolation(&'static str),
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::InvalidLock(l) => write!(f, "lock id {l} is out of range"),
            ThreadError::InvalidCondition(l, c) => {
                write!(f, "condition id {c} is out of range for lock {l}")
            }
            ThreadError::UnknownThread(tid) => {
                write!(f, "{tid} is not known to the scheduler")
            }
            ThreadError::QueueInvariantViolation(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ThreadError {}
