// SPDX-License-Identifier: JOSSL-1.0
// Copyright (C) 2025 The Jotunheim Project

//! A driver in the shape of the reference `example/preemptive_example.c`,
//! minus the interval-timer wiring: four threads, a wait/signal handoff
//! between the first two, and a join on all four from the bootstrap
//! thread.

use cothread::{create, init, join, signal, wait, CondId, LockId};

const BIG: i32 = 1000;

fn worker_a() -> cothread::ThreadResult {
    wait(LockId(1), CondId(2)).unwrap();
    let mut sum = 1;
    for _ in 0..BIG {
        sum += 1;
    }
    signal(LockId(1), CondId(1)).unwrap();
    Box::new(sum)
}

fn worker_b(param: i32) -> cothread::ThreadResult {
    wait(LockId(1), CondId(1)).unwrap();
    let mut sum = param;
    for _ in 0..param * BIG {
        sum += 1;
    }
    Box::new(sum)
}

fn main() {
    init();

    let t1 = create(|| worker_a());
    let t2 = create(|| worker_b(2));
    let t3 = create(|| worker_b(3));
    let t4 = create(|| worker_b(4));

    signal(LockId(1), CondId(2)).unwrap();

    for (label, tid) in [("t1", t1), ("t2", t2), ("t3", t3), ("t4", t4)] {
        let result = join(tid).unwrap();
        println!("{label} => {}", result.downcast::<i32>().unwrap());
    }
}
