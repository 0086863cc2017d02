// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

/// Default number of locks the scheduler provisions at `init`.
pub const NUM_LOCKS: usize = 32;
/// Default number of condition latches per lock.
pub const CONDITIONS_PER_LOCK: usize = 8;
/// Default stack size given to each created thread, in bytes.
pub const STACK_SIZE: usize = 64 * 1024;

/// Overrides for the compile-time defaults, consumed by `init_with_config`.
/// Mainly useful for tests that want a small lock table instead of
/// [`NUM_LOCKS`] / [`CONDITIONS_PER_LOCK`].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub num_locks: usize,
    pub conditions_per_lock: usize,
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_locks: NUM_LOCKS,
            conditions_per_lock: CONDITIONS_PER_LOCK,
            stack_size: STACK_SIZE,
        }
    }
}
