/// The default byte size of a freshly carved chunk slab.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// The default threshold above which requests bypass the pool and go to the
/// host allocator.
pub const DEFAULT_MAX_OBJ_SIZE: usize = 256;

/// The maximal number of blocks per chunk.
///
/// Free blocks link to each other through a one-byte index stored in the
/// block itself, so a chunk can never hold more blocks than a byte can
/// address.
pub const MAX_BLOCKS: usize = u8::MAX as usize;
