use std::time::{Duration, Instant};

use polloc::{FixedAlloc, MappedPool, Pool, Sys, VicinityPool};

const ROUNDS: usize = 100;
const LIVE_TARGET: usize = 4096;
const SIZES: &[usize] = &[8, 16, 24, 32, 40, 64, 96, 136, 200, 256];

fn main() {
    println!("vicinity: {:?}", stress(&mut VicinityPool::new(Sys)));
    println!("mapped:   {:?}", stress(&mut MappedPool::new(Sys)));
}

fn stress<F: FixedAlloc<Base = Sys>>(pool: &mut Pool<F>) -> Duration {
    let mut rng = Rng(0x9e3779b9);
    let mut live: Vec<(*mut u8, usize)> = Vec::with_capacity(LIVE_TARGET);

    let start = Instant::now();
    for _ in 0..ROUNDS {
        while live.len() < LIVE_TARGET {
            let size = SIZES[rng.next() as usize % SIZES.len()];
            let ptr = pool.allocate(size).expect("out of memory");
            unsafe {
                ptr.write(0xA5);
                ptr.add(size - 1).write(0x5A);
            }
            live.push((ptr, size));
        }
        // Free a random half before the next fill.
        for _ in 0..LIVE_TARGET / 2 {
            let (ptr, size) = live.swap_remove(rng.next() as usize % live.len());
            unsafe { pool.deallocate(ptr, size).expect("foreign pointer") };
        }
    }
    for (ptr, size) in live.drain(..) {
        unsafe { pool.deallocate(ptr, size).expect("foreign pointer") };
    }
    let elapsed = start.elapsed();

    pool.stat().assert_clean();
    elapsed
}

struct Rng(u32);

impl Rng {
    fn next(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        self.0
    }
}
