// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

use std::any::Any;

use crate::arch::{Context, Stack};

/// Opaque value handed to `exit` and returned by `join`.
pub type ThreadResult = Box<dyn Any + Send>;

/// Monotonically increasing, never reused. The bootstrap thread is 0.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ThreadId(pub(crate) u64);

impl ThreadId {
    pub const BOOTSTRAP: ThreadId = ThreadId(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

pub(crate) type Entry = Box<dyn FnOnce() -> ThreadResult + Send>;

/// Per-thread state record. Lives in the scheduler's arena for its entire
/// life, from `create`/bootstrap-init until a successful `join` reclaims it.
pub(crate) struct Tcb {
    pub tid: ThreadId,
    pub context: Context,
    /// `None` for the bootstrap thread, which runs on the process's own stack.
    pub stack: Option<Stack>,
    pub parent: Option<ThreadId>,
    pub lock_wait: Option<usize>,
    pub condition_wait: Option<usize>,
    pub result: Option<ThreadResult>,
    /// Taken by the trampoline the first time this thread is resumed.
    pub entry: Option<Entry>,
    pub started: bool,
}
