// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

use core::arch::global_asm;

use super::stack::Stack;

/// Saved machine state for one suspended thread: the SysV callee-saved
/// register file plus the stack pointer. `rip` is carried for inspection
/// only — a freshly built context resumes via the return address left on
/// its stack by `new_child`, not by restoring this field directly.
#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub(crate) struct Context {
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    rbp: u64,
    rbx: u64,
    rsp: u64,
    rip: u64,
    rflags: u64,
}

unsafe extern "C" {
    fn __ctx_switch(prev: *mut Context, next: *const Context);
}

/// Saves the caller's register file into `*prev`, loads `*next`, and
/// resumes there. When `prev` is later switched back into, this call
/// returns as if it had just been an ordinary function call.
///
/// # Safety
/// `prev` and `next` must be valid, non-aliasing pointers to live
/// `Context` values; `next` must have been produced by `Context::default()`
/// and since switched into at least once, or by `Context::new_child`.
#[inline(always)]
pub(crate) unsafe fn switch(prev: *mut Context, next: *const Context) {
    unsafe { __ctx_switch(prev, next) }
}

impl Context {
    /// Builds a context that, when first switched into, starts executing
    /// `entry` on top of `stack` instead of resuming any prior state.
    pub(crate) fn new_child(stack: &mut Stack, entry: extern "C" fn() -> !) -> Context {
        let top = stack.top();
        // `sp` itself must be 16-byte aligned: `ret` pops the word at
        // `sp` and leaves `rsp == sp + 8`, which is the `rsp % 16 == 8`
        // state the SysV ABI requires on entry to a function reached as
        // if by `call` (so a callee's own pushes land it 16-aligned again).
        let sp = top & !0xF;
        unsafe {
            core::ptr::write(sp as *mut u64, entry as usize as u64);
        }
        Context {
            rsp: sp as u64,
            rip: entry as usize as u64,
            ..Context::default()
        }
    }
}

global_asm!(
    ".global __ctx_switch",
    "__ctx_switch:",
    "mov [rdi + 0x00], r15",
    "mov [rdi + 0x08], r14",
    "mov [rdi + 0x10], r13",
    "mov [rdi + 0x18], r12",
    "mov [rdi + 0x20], rbp",
    "mov [rdi + 0x28], rbx",
    "mov [rdi + 0x30], rsp",
    "pushfq",
    "pop rax",
    "mov [rdi + 0x40], rax",
    "mov rsp, [rsi + 0x30]",
    "mov r15, [rsi + 0x00]",
    "mov r14, [rsi + 0x08]",
    "mov r13, [rsi + 0x10]",
    "mov r12, [rsi + 0x18]",
    "mov rbp, [rsi + 0x20]",
    "mov rbx, [rsi + 0x28]",
    "mov rax, [rsi + 0x40]",
    "push rax",
    "popfq",
    "ret",
);
