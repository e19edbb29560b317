#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod base;
mod chunk;
pub mod config;
mod error;
pub mod fixed;
pub mod pool;
pub mod stat;
mod track;

#[cfg(feature = "base-mmap")]
pub use self::base::Mmap;
pub use self::{
    base::{BaseAlloc, Slab, Sys},
    error::Error,
    fixed::{FixedAlloc, MappedAlloc, VicinityAlloc},
    pool::{MappedPool, Pool, VicinityPool},
    stat::Stat,
};

#[cfg(test)]
mod test {
    use alloc::vec::Vec;

    use crate::{base::Sys, fixed::FixedAlloc, pool::Pool, MappedPool, VicinityPool};

    const OPS: usize = 1024;
    const BLOCK: usize = 16;

    fn same_order<F: FixedAlloc<Base = Sys>>(pool: &mut Pool<F>) {
        let blocks: Vec<_> = (0..OPS).map(|_| pool.allocate(BLOCK).unwrap()).collect();
        for ptr in blocks {
            unsafe { pool.deallocate(ptr, BLOCK).unwrap() };
        }
        pool.stat().assert_clean();
    }

    fn reverse_order<F: FixedAlloc<Base = Sys>>(pool: &mut Pool<F>) {
        let blocks: Vec<_> = (0..OPS).map(|_| pool.allocate(BLOCK).unwrap()).collect();
        for ptr in blocks.into_iter().rev() {
            unsafe { pool.deallocate(ptr, BLOCK).unwrap() };
        }
        pool.stat().assert_clean();
    }

    fn butterfly<F: FixedAlloc<Base = Sys>>(pool: &mut Pool<F>) {
        let blocks: Vec<_> = (0..OPS).map(|_| pool.allocate(BLOCK).unwrap()).collect();
        for i in 0..OPS / 2 {
            unsafe {
                pool.deallocate(blocks[i], BLOCK).unwrap();
                pool.deallocate(blocks[OPS - 1 - i], BLOCK).unwrap();
            }
        }
        pool.stat().assert_clean();
    }

    #[test]
    fn trends_vicinity() {
        let mut pool = VicinityPool::new(Sys);
        same_order(&mut pool);
        reverse_order(&mut pool);
        butterfly(&mut pool);
    }

    #[test]
    fn trends_mapped() {
        let mut pool = MappedPool::new(Sys);
        same_order(&mut pool);
        reverse_order(&mut pool);
        butterfly(&mut pool);
    }

    /// Interleaved sizes with write probes, over the host-allocator
    /// threshold and back, with a deterministic generator.
    fn churn<F: FixedAlloc<Base = Sys>>(pool: &mut Pool<F>) {
        let mut state = 0x2545f491_u32;
        let mut rng = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();
        for _ in 0..4096 {
            let roll = rng();
            if roll % 3 != 0 || live.is_empty() {
                let size = match roll % 7 {
                    0 => 8,
                    1 => 16,
                    2 => 24,
                    3 => 40,
                    4 => 64,
                    5 => 136,
                    // Above the default threshold of 256.
                    _ => 384,
                };
                let ptr = pool.allocate(size).unwrap();
                let tag = (roll >> 8) as u8;
                unsafe {
                    ptr.write(tag);
                    ptr.add(size - 1).write(tag);
                }
                live.push((ptr, size, tag));
            } else {
                let (ptr, size, tag) = live.swap_remove(rng() as usize % live.len());
                unsafe {
                    assert_eq!(ptr.read(), tag, "block head was clobbered");
                    assert_eq!(ptr.add(size - 1).read(), tag, "block tail was clobbered");
                    pool.deallocate(ptr, size).unwrap();
                }
            }
        }
        for (ptr, size, tag) in live {
            unsafe {
                assert_eq!(ptr.read(), tag);
                pool.deallocate(ptr, size).unwrap();
            }
        }
        pool.stat().assert_clean();
    }

    #[test]
    fn churn_vicinity() {
        let mut pool = VicinityPool::new(Sys);
        churn(&mut pool);
    }

    #[test]
    fn churn_mapped() {
        let mut pool = MappedPool::new(Sys);
        churn(&mut pool);
    }

    #[test]
    fn repeated_rounds_return_to_the_initial_footprint() {
        let mut pool = MappedPool::new(Sys);
        let mut footprint = None;
        for _ in 0..4 {
            same_order(&mut pool);
            let chunks = pool.stat().chunks;
            // Parked chunks are reused round after round instead of piling
            // up.
            assert_eq!(*footprint.get_or_insert(chunks), chunks);
        }
    }
}
