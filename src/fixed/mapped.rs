use alloc::{
    collections::{BTreeMap, VecDeque},
    vec::Vec,
};
use core::ptr::NonNull;

use crate::{
    base::BaseAlloc,
    chunk::Chunk,
    error::Error,
    fixed::{block_count, FixedAlloc},
};

/// A fixed-block allocator over a deque of chunks with an ordered
/// address-to-chunk map.
///
/// Deallocation looks the owning chunk up by the greatest slab base address
/// at most the freed address, so arbitrary free patterns cost `O(log N)`
/// instead of degenerating the way an outward scan does when frees jump
/// across many chunks.
///
/// Chunks are appended at the back only and are never removed before drop;
/// indices into the deque therefore stay stable. A chunk whose last block
/// comes back is unregistered from the map and parked in a cache of empty
/// chunks, from where the next allocation revives it without carving a new
/// slab. A count of full chunks short-circuits the "is there any room?"
/// probe when a fresh chunk is the only option.
pub struct MappedAlloc<B: BaseAlloc> {
    block_size: usize,
    num_blocks: u8,
    /// Full chunks, not counting the allocation hint: the hint is only
    /// counted once it turns stale, at the top of the allocation slow path.
    num_full: usize,
    chunks: VecDeque<Chunk<B>>,
    /// Slab base address → index in `chunks`, for every chunk that is not
    /// parked in `free_chunks`.
    chunk_map: BTreeMap<usize, usize>,
    free_chunks: Vec<usize>,
    alloc_chunk: Option<usize>,
    dealloc_chunk: Option<usize>,
    base: B,
}

impl<B: BaseAlloc> MappedAlloc<B> {
    fn allocate_inner(&mut self) -> Result<NonNull<u8>, Error<B>> {
        let index = match self.alloc_chunk {
            Some(i) if self.chunks[i].available() > 0 => i,
            stale => {
                // Count the chunk the hint just filled before anything else,
                // so the all-full test below is accurate; drop the hint so a
                // failed slab acquisition cannot count it twice.
                if let Some(i) = stale {
                    debug_assert_eq!(self.chunks[i].available(), 0);
                    self.num_full += 1;
                    debug_assert!(self.num_full <= self.chunks.len());
                    self.alloc_chunk = None;
                }

                let index = if let Some(index) = self.free_chunks.pop() {
                    let prev = self.chunk_map.insert(self.chunks[index].base_addr(), index);
                    debug_assert!(prev.is_none());
                    index
                } else if self.num_full == self.chunks.len() {
                    let chunk = Chunk::new(self.block_size, self.num_blocks, &self.base)
                        .map_err(Error::Slab)?;
                    let index = self.chunks.len();
                    self.chunk_map.insert(chunk.base_addr(), index);
                    self.chunks.push_back(chunk);
                    #[cfg(feature = "error-log")]
                    log::trace!(
                        "carved a chunk for {}-byte blocks ({} total)",
                        self.block_size,
                        self.chunks.len()
                    );
                    if self.dealloc_chunk.is_none() {
                        self.dealloc_chunk = Some(0);
                    }
                    index
                } else {
                    // Some mapped chunk has room; take the lowest-addressed
                    // one.
                    match self.chunk_map.values().find(|&&i| self.chunks[i].available() > 0) {
                        Some(&i) => i,
                        None => unreachable!("neither full nor cached, yet absent from the map"),
                    }
                };
                self.alloc_chunk = Some(index);
                index
            }
        };

        match self.chunks[index].allocate(self.block_size) {
            Some(ptr) => Ok(ptr),
            None => unreachable!("the allocation chunk has blocks available"),
        }
    }

    /// # Safety
    ///
    /// If `ptr` is owned by this allocator, it must point to a currently
    /// outstanding block. Pointers owned by no chunk are rejected with
    /// [`Error::ForeignPointer`] before any state changes.
    unsafe fn deallocate_inner(&mut self, ptr: NonNull<u8>) -> Result<(), Error<B>> {
        debug_assert!(self.dealloc_chunk.map_or(true, |i| i < self.chunks.len()));
        let addr = ptr.as_ptr() as usize;

        let (&base, &index) = match self.chunk_map.range(..=addr).next_back() {
            Some(entry) => entry,
            None => return Err(Error::ForeignPointer),
        };
        debug_assert_eq!(self.chunks[index].base_addr(), base);
        if addr >= base + self.chunks[index].len() {
            return Err(Error::ForeignPointer);
        }
        debug_assert_eq!((addr - base) % self.block_size, 0);

        let was_full = self.chunks[index].available() == 0;
        let was_alloc_hint = self.alloc_chunk == Some(index);
        self.dealloc_chunk = Some(index);

        // SAFETY: the map lookup located the owning chunk; the block state
        // is guaranteed by the caller.
        unsafe { self.chunks[index].deallocate(ptr, self.block_size) };

        if self.chunks[index].available() == self.num_blocks {
            self.chunk_map.remove(&base);
            self.free_chunks.push(index);
            self.dealloc_chunk = Some(0);
            // A parked chunk must not stay the allocation hint: the fast
            // path would hand out blocks invisible to the map.
            if was_alloc_hint {
                self.alloc_chunk = None;
            }
        }

        // The hint chunk is never part of `num_full` (see the field doc).
        if was_full && !was_alloc_hint {
            self.num_full -= 1;
        }
        Ok(())
    }

    #[cfg(test)]
    fn cached_chunks(&self) -> usize {
        self.free_chunks.len()
    }
}

impl<B: BaseAlloc> Drop for MappedAlloc<B> {
    fn drop(&mut self) {
        for chunk in &self.chunks {
            debug_assert_eq!(
                chunk.available(),
                self.num_blocks,
                "chunk of {}-byte blocks dropped with blocks still in use",
                self.block_size,
            );
        }
    }
}

impl<B: BaseAlloc> FixedAlloc for MappedAlloc<B> {
    type Base = B;

    fn new(block_size: usize, chunk_size: usize, base: B) -> Self {
        let num_blocks = block_count(block_size, chunk_size);
        MappedAlloc {
            block_size,
            num_blocks,
            num_full: 0,
            chunks: VecDeque::new(),
            chunk_map: BTreeMap::new(),
            free_chunks: Vec::new(),
            alloc_chunk: None,
            dealloc_chunk: None,
            base,
        }
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate(&mut self) -> Result<NonNull<u8>, Error<B>> {
        self.allocate_inner()
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<(), Error<B>> {
        // SAFETY: guaranteed by the caller.
        unsafe { self.deallocate_inner(ptr) }
    }

    fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn empty_chunk_count(&self) -> usize {
        let n = self.num_blocks;
        self.chunks.iter().filter(|c| c.available() == n).count()
    }

    fn blocks_in_use(&self) -> usize {
        let per_chunk = self.num_blocks as usize;
        self.chunks
            .iter()
            .map(|c| per_chunk - c.available() as usize)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::base::Sys;

    fn fixed(block_size: usize) -> MappedAlloc<Sys> {
        MappedAlloc::new(block_size, 4096, Sys)
    }

    #[test]
    fn bulk_same_order() {
        let mut fixed = fixed(16);
        let blocks: Vec<_> = (0..1024).map(|_| fixed.allocate().unwrap()).collect();
        assert_eq!(fixed.blocks_in_use(), 1024);
        for ptr in blocks {
            unsafe { fixed.deallocate(ptr).unwrap() };
        }
        assert_eq!(fixed.blocks_in_use(), 0);
        // Every chunk went empty through a deallocation, so every chunk is
        // parked for reuse and the map is drained.
        assert_eq!(fixed.cached_chunks(), fixed.chunk_count());
        assert!(fixed.chunk_map.is_empty());
    }

    #[test]
    fn bulk_reverse_order() {
        let mut fixed = fixed(16);
        let blocks: Vec<_> = (0..1024).map(|_| fixed.allocate().unwrap()).collect();
        for ptr in blocks.into_iter().rev() {
            unsafe { fixed.deallocate(ptr).unwrap() };
        }
        assert_eq!(fixed.blocks_in_use(), 0);
        assert_eq!(fixed.cached_chunks(), fixed.chunk_count());
    }

    #[test]
    fn butterfly_order() {
        let mut fixed = fixed(16);
        let blocks: Vec<_> = (0..1024).map(|_| fixed.allocate().unwrap()).collect();
        for i in 0..512 {
            unsafe {
                fixed.deallocate(blocks[i]).unwrap();
                fixed.deallocate(blocks[1023 - i]).unwrap();
            }
        }
        assert_eq!(fixed.blocks_in_use(), 0);
        assert_eq!(fixed.cached_chunks(), fixed.chunk_count());
    }

    #[test]
    fn foreign_pointer_is_rejected() {
        let mut fixed = fixed(16);
        let ptr = fixed.allocate().unwrap();

        let mut on_stack = 0u64;
        let foreign = NonNull::from(&mut on_stack).cast::<u8>();
        let err = unsafe { fixed.deallocate(foreign) };
        assert!(matches!(err, Err(Error::ForeignPointer)));

        // The failed call must leave the allocator untouched.
        assert_eq!(fixed.blocks_in_use(), 1);
        unsafe { fixed.deallocate(ptr).unwrap() };
        assert_eq!(fixed.blocks_in_use(), 0);
    }

    #[test]
    fn parked_chunk_is_revived_through_the_map() {
        let mut fixed = fixed(16);

        // Empty the only chunk, parking it, then allocate again: the block
        // must come from the revived chunk and round-trip through the map
        // lookup.
        let ptr = fixed.allocate().unwrap();
        unsafe { fixed.deallocate(ptr).unwrap() };
        assert_eq!(fixed.cached_chunks(), 1);

        let ptr = fixed.allocate().unwrap();
        assert_eq!(fixed.cached_chunks(), 0);
        assert_eq!(fixed.chunk_count(), 1);
        unsafe { fixed.deallocate(ptr).unwrap() };
        assert_eq!(fixed.cached_chunks(), 1);
    }

    #[test]
    fn full_counter_tracks_filled_chunks() {
        let per_chunk = 4096 / 512; // 8 blocks per chunk
        let mut fixed = fixed(512);

        let first: Vec<_> = (0..per_chunk).map(|_| fixed.allocate().unwrap()).collect();
        assert_eq!(fixed.chunk_count(), 1);

        // The next allocation must notice that every chunk is full and carve
        // a new one rather than scanning.
        let extra = fixed.allocate().unwrap();
        assert_eq!(fixed.chunk_count(), 2);
        assert_eq!(fixed.num_full, 1);

        // Freeing from the full chunk uncounts it.
        unsafe { fixed.deallocate(first[0]).unwrap() };
        assert_eq!(fixed.num_full, 0);

        unsafe {
            fixed.deallocate(extra).unwrap();
            for ptr in first.into_iter().skip(1) {
                fixed.deallocate(ptr).unwrap();
            }
        }
        assert_eq!(fixed.blocks_in_use(), 0);
    }

    #[test]
    fn refilling_a_drained_chunk_round_trips() {
        // Fill a chunk, free every block (parking the chunk while it is
        // still the allocation hint), then allocate again. The revived
        // chunk must be re-registered before its blocks go out, or the
        // subsequent frees would be rejected as foreign.
        let per_chunk = 4096 / 512;
        let mut fixed = fixed(512);

        for _ in 0..3 {
            let blocks: Vec<_> = (0..per_chunk).map(|_| fixed.allocate().unwrap()).collect();
            for ptr in blocks {
                unsafe { fixed.deallocate(ptr).unwrap() };
            }
            assert_eq!(fixed.chunk_count(), 1);
        }
    }

    #[test]
    fn single_block_chunks() {
        // block size == chunk size: every chunk holds exactly one block, so
        // chunks oscillate between full and parked with every operation.
        let mut fixed = MappedAlloc::new(64, 64, Sys);
        let a = fixed.allocate().unwrap();
        let b = fixed.allocate().unwrap();
        assert_eq!(fixed.chunk_count(), 2);
        unsafe {
            fixed.deallocate(a).unwrap();
            fixed.deallocate(b).unwrap();
        }
        let c = fixed.allocate().unwrap();
        unsafe { fixed.deallocate(c).unwrap() };
        assert_eq!(fixed.blocks_in_use(), 0);
        assert_eq!(fixed.num_full, 0);
    }

    #[test]
    fn distinct_addresses() {
        let mut fixed = fixed(24);
        let mut blocks: Vec<_> = (0..300).map(|_| fixed.allocate().unwrap()).collect();
        blocks.sort_by_key(|p| p.as_ptr() as usize);
        for pair in blocks.windows(2) {
            assert!(pair[0].as_ptr() as usize + 24 <= pair[1].as_ptr() as usize);
        }
        for ptr in blocks {
            unsafe { fixed.deallocate(ptr).unwrap() };
        }
    }
}
