//! Serving the pool from `mmap` slabs instead of the global allocator.
//!
//! Run with `cargo run --example custom --features base-mmap`.

use polloc::{MappedPool, Mmap};

fn main() {
    let mut pool = MappedPool::with_config(1 << 16, 1024, Mmap::new());

    let blocks: Vec<_> = (0..10_000)
        .map(|i| {
            let size = 8 + 8 * (i % 100);
            let ptr = pool.allocate(size).expect("out of memory");
            unsafe { ptr.write_bytes(0xFE, size) };
            (ptr, size)
        })
        .collect();

    let stat = pool.stat();
    println!(
        "{} size classes over {} chunks, {} blocks live",
        stat.size_classes, stat.chunks, stat.blocks_in_use
    );

    for (ptr, size) in blocks {
        unsafe { pool.deallocate(ptr, size).expect("foreign pointer") };
    }
    pool.stat().assert_clean();
}
