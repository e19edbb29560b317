use alloc::{rc::Rc, vec::Vec};
use core::{cell::RefCell, ptr::NonNull};

use crate::{
    base::BaseAlloc,
    chunk::Chunk,
    error::Error,
    fixed::{block_count, FixedAlloc},
};

/// A fixed-block allocator over a vector of chunks.
///
/// Allocation keeps a hint to the chunk that served the last request; when
/// the hint is full, a linear scan finds room or a fresh chunk is appended.
/// Deallocation locates the owning chunk by searching outward from the chunk
/// that owned the last freed pointer, one step toward each end per turn, so
/// callers with any locality in their free pattern pay near-constant cost.
///
/// At most one fully-empty chunk is retained: a second empty chunk is
/// released on the spot, and empties are swapped to the tail of the vector
/// where they are first in line for the next allocation. This keeps bulk
/// churn from oscillating between carving and releasing a chunk.
///
/// Cloning the allocator yields a handle to the *same* chunk collection;
/// the chunks are released when the last handle is dropped.
pub struct VicinityAlloc<B: BaseAlloc> {
    inner: Rc<RefCell<Inner<B>>>,
}

impl<B: BaseAlloc> Clone for VicinityAlloc<B> {
    fn clone(&self) -> Self {
        VicinityAlloc { inner: Rc::clone(&self.inner) }
    }
}

struct Inner<B: BaseAlloc> {
    block_size: usize,
    num_blocks: u8,
    chunks: Vec<Chunk<B>>,
    alloc_chunk: Option<usize>,
    dealloc_chunk: Option<usize>,
    base: B,
}

impl<B: BaseAlloc> Inner<B> {
    fn allocate(&mut self) -> Result<NonNull<u8>, Error<B>> {
        let index = match self.alloc_chunk {
            Some(i) if self.chunks[i].available() > 0 => i,
            _ => {
                let index = match self.chunks.iter().position(|c| c.available() > 0) {
                    Some(i) => i,
                    None => {
                        let chunk = Chunk::new(self.block_size, self.num_blocks, &self.base)
                            .map_err(Error::Slab)?;
                        self.chunks.push(chunk);
                        #[cfg(feature = "error-log")]
                        log::trace!(
                            "carved a chunk for {}-byte blocks ({} total)",
                            self.block_size,
                            self.chunks.len()
                        );
                        let index = self.chunks.len() - 1;
                        if self.dealloc_chunk.is_none() {
                            self.dealloc_chunk = Some(index);
                        }
                        index
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
    /// `ptr` must have been allocated from one of `self.chunks` and not
    /// freed since.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        debug_assert!(!self.chunks.is_empty());

        let index = self.vicinity_find(ptr.as_ptr() as usize);
        self.dealloc_chunk = Some(index);
        // SAFETY: the search located the owning chunk; the block state is
        // guaranteed by the caller.
        unsafe { self.chunks[index].deallocate(ptr, self.block_size) };

        self.release_spare(index);
    }

    /// Searches outward from the deallocation hint, alternating a cursor
    /// toward the front with one toward the back.
    ///
    /// Diverges if the pointer belongs to no chunk; the caller contract
    /// rules that out.
    fn vicinity_find(&self, addr: usize) -> usize {
        debug_assert!(self.dealloc_chunk.is_some());
        let start = self.dealloc_chunk.unwrap_or(0).min(self.chunks.len() - 1);

        let mut low = Some(start);
        let mut high = (start + 1 < self.chunks.len()).then(|| start + 1);

        loop {
            if let Some(i) = low {
                if self.chunks[i].contains(addr) {
                    return i;
                }
                low = i.checked_sub(1);
            }
            if let Some(i) = high {
                if self.chunks[i].contains(addr) {
                    return i;
                }
                high = (i + 1 < self.chunks.len()).then(|| i + 1);
            }
            if low.is_none() && high.is_none() {
                unreachable!("pointer not owned by any chunk");
            }
        }
    }

    /// Releases a chunk once two of them sit empty, keeping at most one
    /// spare. The surviving empty chunk moves to the tail, primed for the
    /// next allocation.
    fn release_spare(&mut self, index: usize) {
        let n = self.num_blocks;
        if self.chunks[index].available() != n {
            return;
        }

        let last = self.chunks.len() - 1;
        if index == last {
            if last > 0 && self.chunks[last - 1].available() == n {
                self.chunks.pop();
                #[cfg(feature = "error-log")]
                log::trace!("released a spare chunk of {}-byte blocks", self.block_size);
                self.alloc_chunk = Some(0);
                self.dealloc_chunk = Some(0);
            }
        } else if self.chunks[last].available() == n {
            self.chunks.pop();
            #[cfg(feature = "error-log")]
            log::trace!("released a spare chunk of {}-byte blocks", self.block_size);
            self.alloc_chunk = Some(index);
        } else {
            self.chunks.swap(index, last);
            self.alloc_chunk = Some(last);
        }
    }
}

impl<B: BaseAlloc> Drop for Inner<B> {
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

impl<B: BaseAlloc> FixedAlloc for VicinityAlloc<B> {
    type Base = B;

    fn new(block_size: usize, chunk_size: usize, base: B) -> Self {
        let num_blocks = block_count(block_size, chunk_size);
        VicinityAlloc {
            inner: Rc::new(RefCell::new(Inner {
                block_size,
                num_blocks,
                chunks: Vec::new(),
                alloc_chunk: None,
                dealloc_chunk: None,
                base,
            })),
        }
    }

    fn block_size(&self) -> usize {
        self.inner.borrow().block_size
    }

    fn allocate(&mut self) -> Result<NonNull<u8>, Error<B>> {
        self.inner.borrow_mut().allocate()
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>) -> Result<(), Error<B>> {
        // SAFETY: guaranteed by the caller.
        unsafe { self.inner.borrow_mut().deallocate(ptr) };
        Ok(())
    }

    fn chunk_count(&self) -> usize {
        self.inner.borrow().chunks.len()
    }

    fn empty_chunk_count(&self) -> usize {
        let inner = self.inner.borrow();
        let n = inner.num_blocks;
        inner.chunks.iter().filter(|c| c.available() == n).count()
    }

    fn blocks_in_use(&self) -> usize {
        let inner = self.inner.borrow();
        let per_chunk = inner.num_blocks as usize;
        inner
            .chunks
            .iter()
            .map(|c| per_chunk - c.available() as usize)
            .sum()
    }
}
