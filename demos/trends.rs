use std::time::{Duration, Instant};

use polloc::{FixedAlloc, MappedPool, Pool, Sys, VicinityPool};

const OPS: usize = 100_000;
const SIZE: usize = 16;

fn main() {
    run("vicinity", &mut VicinityPool::new(Sys));
    run("mapped", &mut MappedPool::new(Sys));
}

fn run<F: FixedAlloc<Base = Sys>>(name: &str, pool: &mut Pool<F>) {
    println!("===== {name} =====");
    println!("same order:    {:?}", trend(pool, |i, _| i));
    println!("reverse order: {:?}", trend(pool, |i, n| n - 1 - i));
    println!(
        "butterfly:     {:?}",
        trend(pool, |i, n| if i % 2 == 0 { i / 2 } else { n - 1 - i / 2 })
    );
}

fn trend<F: FixedAlloc<Base = Sys>>(
    pool: &mut Pool<F>,
    order: impl Fn(usize, usize) -> usize,
) -> Duration {
    let start = Instant::now();

    let blocks: Vec<_> = (0..OPS)
        .map(|_| pool.allocate(SIZE).expect("out of memory"))
        .collect();
    for i in 0..OPS {
        let ptr = blocks[order(i, OPS)];
        unsafe { pool.deallocate(ptr, SIZE).expect("foreign pointer") };
    }

    let elapsed = start.elapsed();
    pool.stat().assert_clean();
    elapsed
}
