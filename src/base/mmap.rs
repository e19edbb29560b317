use core::{alloc::Layout, mem::ManuallyDrop, ptr::NonNull};

use region::{Allocation, Protection};

use super::{BaseAlloc, Slab};

/// A base allocator backed by the `mmap` function series.
#[derive(Debug, Clone, Copy, Default, Hash)]
pub struct Mmap;

impl Mmap {
    /// Creates a new `mmap` base allocator.
    pub const fn new() -> Self {
        Mmap
    }
}

// SAFETY: Fresh mappings are valid, free and uniquely owned by their
// `Allocation` handle.
unsafe impl BaseAlloc for Mmap {
    type Error = region::Error;
    type Handle = ManuallyDrop<Allocation>;

    fn allocate(&self, layout: Layout) -> Result<Slab<Self>, Self::Error> {
        fn round_up(addr: usize, layout: Layout) -> usize {
            (addr + layout.align() - 1) & !(layout.align() - 1)
        }

        let mut trial = region::alloc(layout.size(), Protection::READ_WRITE)?;
        if trial.as_ptr::<u8>() as usize % layout.align() == 0 {
            let ptr = NonNull::new(trial.as_mut_ptr()).unwrap();
            // SAFETY: The slab is allocated from self.
            return Ok(unsafe { Slab::new(ptr, layout, ManuallyDrop::new(trial)) });
        }

        drop(trial);
        let mut a = region::alloc(layout.size() + layout.align(), Protection::READ_WRITE)?;
        let base = a.as_mut_ptr::<u8>();
        let aligned = round_up(base as usize, layout) - base as usize;
        // SAFETY: `aligned` is less than the over-allocated tail.
        let ptr = NonNull::new(unsafe { base.add(aligned) }).unwrap();

        // SAFETY: The slab is allocated from self.
        Ok(unsafe { Slab::new(ptr, layout, ManuallyDrop::new(a)) })
    }

    unsafe fn deallocate(slab: &mut Slab<Self>) {
        // SAFETY: The handle is dropped exactly once, here.
        unsafe { ManuallyDrop::drop(&mut slab.handle) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmap_round_trip() {
        let layout = Layout::from_size_align(4096, 4096).unwrap();
        let slab = Mmap.allocate(layout).unwrap();
        assert_eq!(slab.base_addr() % 4096, 0);
        unsafe {
            slab.pointer().as_ptr().write_bytes(0x5A, slab.len());
        }
    }
}
