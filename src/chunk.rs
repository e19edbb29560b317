use core::{alloc::Layout, mem, ptr::NonNull};

use crate::{
    base::{BaseAlloc, Slab},
    track,
};

/// One contiguous slab carved into fixed-size blocks.
///
/// # Invariant
///
/// While a block is free, its first byte holds the index of the next free
/// block, forming a singly-linked chain threaded through the slab itself.
/// The chain starts at `first_free`, contains exactly `free_count` distinct
/// indices and never cycles.
///
/// The block size and block count are owned by the fixed allocator above and
/// passed into every operation; the chunk itself only knows its slab.
pub(crate) struct Chunk<B: BaseAlloc> {
    slab: Slab<B>,
    first_free: u8,
    free_count: u8,
}

impl<B: BaseAlloc> Chunk<B> {
    /// Acquires a slab of `count * block_size` bytes and threads the free
    /// list through it.
    ///
    /// On base failure nothing is retained; the error surfaces before any
    /// bookkeeping exists.
    pub fn new(block_size: usize, count: u8, base: &B) -> Result<Self, B::Error> {
        debug_assert!(block_size >= 1);
        debug_assert!(count >= 1);

        let layout =
            Layout::from_size_align(block_size * count as usize, mem::align_of::<usize>())
                .unwrap();
        let slab = base.allocate(layout)?;

        let base_ptr = slab.pointer().as_ptr();
        for i in 0..count {
            // SAFETY: block `i` starts within the slab; its first byte is
            // ours until the block is handed out.
            unsafe { base_ptr.add(i as usize * block_size).write(i + 1) };
        }

        Ok(Chunk { slab, first_free: 0, free_count: count })
    }

    pub fn available(&self) -> u8 {
        self.free_count
    }

    pub fn base_addr(&self) -> usize {
        self.slab.base_addr()
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr < base + self.len()
    }

    /// Unlinks and returns the head block of the free list, or `None` when
    /// every block is handed out.
    pub fn allocate(&mut self, block_size: usize) -> Option<NonNull<u8>> {
        if self.free_count == 0 {
            return None;
        }

        let offset = self.first_free as usize * block_size;
        debug_assert!(offset < self.len());
        // SAFETY: `first_free` indexes a block inside the slab.
        let block = unsafe { self.slab.pointer().as_ptr().add(offset) };
        // SAFETY: `block` is derived from the slab pointer, hence non-null.
        let ptr = unsafe { NonNull::new_unchecked(block) };

        track::defined(ptr, 1);
        // SAFETY: a free block's first byte holds the next free index.
        self.first_free = unsafe { block.read() };
        self.free_count -= 1;

        track::allocate(ptr, block_size);
        Some(ptr)
    }

    /// Relinks `ptr` as the new head of the free list.
    ///
    /// # Safety
    ///
    /// `ptr` must lie within this chunk's slab, be block-aligned, and refer
    /// to a block currently handed out by [`allocate`](Chunk::allocate).
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, block_size: usize) {
        let addr = ptr.as_ptr() as usize;
        debug_assert!(self.contains(addr));
        debug_assert_eq!((addr - self.base_addr()) % block_size, 0);

        let index = ((addr - self.base_addr()) / block_size) as u8;

        track::deallocate(ptr);
        track::undefined(ptr, 1);
        // SAFETY: the block is returned to us; its first byte now carries
        // the free-list link.
        unsafe { ptr.as_ptr().write(self.first_free) };
        track::no_access(ptr, 1);

        self.first_free = index;
        self.free_count += 1;
    }

    /// Walks the free list and returns the indices in chain order.
    #[cfg(test)]
    pub fn free_list(&self, block_size: usize, count: u8) -> alloc::vec::Vec<u8> {
        let mut indices = alloc::vec::Vec::new();
        let mut cursor = self.first_free;
        for _ in 0..self.free_count {
            assert!(cursor < count, "free-list index out of bounds");
            indices.push(cursor);
            let offset = cursor as usize * block_size;
            cursor = unsafe { self.slab.pointer().as_ptr().add(offset).read() };
        }
        indices
    }
}
