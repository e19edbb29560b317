//! The module of size-class pools.
//!
//! See [`Pool`] for more information.

use alloc::vec::Vec;
use core::{
    alloc::Layout,
    mem,
    ptr::{self, NonNull},
};

use crate::{
    base::Sys,
    config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_OBJ_SIZE},
    error::{log_error, Error},
    fixed::{FixedAlloc, MappedAlloc, VicinityAlloc},
    stat::Stat,
};

/// A small-object allocator dispatching requests by exact byte size.
///
/// The pool keeps one [fixed allocator](FixedAlloc) per block size it has
/// ever been asked for, sorted ascending, so a sparse size distribution
/// costs `O(log K)` lookup over the `K` observed sizes and no memory for
/// sizes never requested. Hints to the allocators that served the last
/// allocation and the last deallocation catch runs of same-sized requests
/// before any search happens.
///
/// Requests above [`max_obj_size`](Pool::max_obj_size) bypass the pool and
/// go straight to the host allocator, and their pointers must come back
/// through [`deallocate`](Pool::deallocate) with the same size.
///
/// Deallocation takes the byte size of the original request. Handing the
/// bookkeeping of sizes to the caller is what keeps the hot path free of
/// any per-block header.
pub struct Pool<F: FixedAlloc> {
    pool: Vec<F>,
    last_alloc: Option<usize>,
    last_dealloc: Option<usize>,
    chunk_size: usize,
    max_obj_size: usize,
    base: F::Base,
}

/// A pool over the [vector-backed](VicinityAlloc) fixed allocators.
pub type VicinityPool<B = Sys> = Pool<VicinityAlloc<B>>;

/// A pool over the [map-backed](MappedAlloc) fixed allocators.
pub type MappedPool<B = Sys> = Pool<MappedAlloc<B>>;

impl<F: FixedAlloc> Pool<F> {
    /// Creates a pool with the default chunk size and threshold.
    pub fn new(base: F::Base) -> Self {
        Self::with_config(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_OBJ_SIZE, base)
    }

    /// Creates a pool carving slabs of `chunk_size` bytes and serving
    /// requests of at most `max_obj_size` bytes from them.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= max_obj_size <= chunk_size`.
    pub fn with_config(chunk_size: usize, max_obj_size: usize, base: F::Base) -> Self {
        assert!(
            (1..=chunk_size).contains(&max_obj_size),
            "the pool threshold {max_obj_size} must lie within 1..={chunk_size}"
        );
        Pool {
            pool: Vec::new(),
            last_alloc: None,
            last_dealloc: None,
            chunk_size,
            max_obj_size,
            base,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// The threshold above which requests go to the host allocator.
    pub fn max_obj_size(&self) -> usize {
        self.max_obj_size
    }

    /// The block sizes currently represented, in ascending order.
    pub fn size_classes(&self) -> impl Iterator<Item = usize> + '_ {
        self.pool.iter().map(|fixed| fixed.block_size())
    }

    /// Takes a snapshot of the bookkeeping counters.
    pub fn stat(&self) -> Stat {
        let mut stat = Stat {
            size_classes: self.pool.len(),
            ..Stat::default()
        };
        for fixed in &self.pool {
            stat.chunks += fixed.chunk_count();
            stat.empty_chunks += fixed.empty_chunk_count();
            stat.blocks_in_use += fixed.blocks_in_use();
        }
        stat
    }

    /// Allocates `size` bytes.
    ///
    /// Zero-sized requests yield a null pointer; everything else is either
    /// a block from the size's pool or, above the threshold, a host
    /// allocation. Word-multiple sizes receive word-aligned addresses.
    pub fn allocate(&mut self, size: usize) -> Result<*mut u8, Error<F::Base>> {
        self.allocate_inner(size).map_err(|err| {
            log_error(&err);
            err
        })
    }

    fn allocate_inner(&mut self, size: usize) -> Result<*mut u8, Error<F::Base>> {
        if size == 0 {
            return Ok(ptr::null_mut());
        }
        if size > self.max_obj_size {
            return Self::host_allocate(size);
        }

        if let Some(i) = self.last_alloc {
            if self.pool[i].block_size() == size {
                return self.pool[i].allocate().map(NonNull::as_ptr);
            }
        }

        let index = match self.pool.binary_search_by(|f| f.block_size().cmp(&size)) {
            Ok(i) => i,
            Err(i) => {
                self.pool.insert(i, F::new(size, self.chunk_size, self.base.clone()));
                // The insertion shifted every index at and after `i`; the
                // dealloc hint is conservatively reset to the front.
                self.last_dealloc = Some(0);
                i
            }
        };
        self.last_alloc = Some(index);
        self.pool[index].allocate().map(NonNull::as_ptr)
    }

    /// Deallocates a pointer previously returned by
    /// [`allocate`](Pool::allocate). Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this pool with this exact `size`
    /// and not deallocated since.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) -> Result<(), Error<F::Base>> {
        // SAFETY: guaranteed by the caller.
        unsafe { self.deallocate_inner(ptr, size) }.map_err(|err| {
            log_error(&err);
            err
        })
    }

    unsafe fn deallocate_inner(
        &mut self,
        ptr: *mut u8,
        size: usize,
    ) -> Result<(), Error<F::Base>> {
        let Some(ptr) = NonNull::new(ptr) else {
            return Ok(());
        };
        if size > self.max_obj_size {
            // SAFETY: above the threshold the pointer came from
            // `host_allocate` with the very same size.
            unsafe { Self::host_deallocate(ptr, size) };
            return Ok(());
        }

        if let Some(i) = self.last_dealloc {
            if self.pool[i].block_size() == size {
                // SAFETY: guaranteed by the caller.
                return unsafe { self.pool[i].deallocate(ptr) };
            }
        }

        let index = match self.pool.binary_search_by(|f| f.block_size().cmp(&size)) {
            Ok(i) => i,
            Err(_) => {
                debug_assert!(false, "no pool entry serves {size}-byte blocks");
                return Err(Error::ForeignPointer);
            }
        };
        self.last_dealloc = Some(index);
        // SAFETY: guaranteed by the caller.
        unsafe { self.pool[index].deallocate(ptr) }
    }

    fn host_allocate(size: usize) -> Result<*mut u8, Error<F::Base>> {
        let layout = match Self::host_layout(size) {
            Some(layout) => layout,
            None => return Err(Error::Host(size)),
        };
        // SAFETY: `layout` has a nonzero size.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(Error::Host(size));
        }
        Ok(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must have been returned by [`host_allocate`](Pool::host_allocate)
    /// for the same `size`.
    unsafe fn host_deallocate(ptr: NonNull<u8>, size: usize) {
        let layout = Self::host_layout(size)
            .unwrap_or_else(|| unreachable!("the layout was valid at allocation"));
        // SAFETY: `ptr` was allocated by `alloc` with the same layout.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) };
    }

    fn host_layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, mem::align_of::<usize>()).ok()
    }
}
