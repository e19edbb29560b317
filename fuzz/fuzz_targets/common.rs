use libfuzzer_sys::arbitrary::Arbitrary;

use polloc::{FixedAlloc, Pool, Sys};

#[derive(Debug, Arbitrary)]
pub enum Action {
    Allocate { size: u16 },
    Deallocate { index: u8 },
}

pub fn run<F: FixedAlloc<Base = Sys>>(pool: &mut Pool<F>, actions: Vec<Action>) {
    let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();

    for (step, action) in actions.into_iter().enumerate() {
        match action {
            Action::Allocate { size } => {
                // Mostly pooled sizes, sometimes over the threshold.
                let size = size as usize % 512;
                let ptr = pool.allocate(size).expect("out of memory");
                if size == 0 {
                    assert!(ptr.is_null());
                    continue;
                }
                let tag = step as u8;
                unsafe {
                    ptr.write(tag);
                    ptr.add(size - 1).write(tag);
                }
                live.push((ptr, size, tag));
            }
            Action::Deallocate { index } => {
                if (index as usize) < live.len() {
                    let (ptr, size, tag) = live.swap_remove(index as usize);
                    unsafe {
                        assert_eq!(ptr.read(), tag);
                        assert_eq!(ptr.add(size - 1).read(), tag);
                        pool.deallocate(ptr, size).expect("foreign pointer");
                    }
                }
            }
        }
    }

    for (ptr, size, tag) in live {
        unsafe {
            assert_eq!(ptr.read(), tag);
            pool.deallocate(ptr, size).expect("foreign pointer");
        }
    }
    pool.stat().assert_clean();
}
