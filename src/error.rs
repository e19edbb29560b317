use core::fmt;

use crate::base::BaseAlloc;

/// Errors of pool operations.
pub enum Error<B: BaseAlloc> {
    /// The base allocator refused to supply a slab for a new chunk. No
    /// bookkeeping was touched; the failed chunk is discarded whole.
    Slab(B::Error),
    /// The host allocator refused an above-threshold request of this many
    /// bytes.
    Host(usize),
    /// The deallocated pointer is not owned by any chunk of this allocator.
    ///
    /// Only the map-based fixed allocator can detect this; its state is left
    /// unchanged when it does.
    ForeignPointer,
}

impl<B: BaseAlloc> fmt::Debug for Error<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Slab(err) => f.debug_tuple("Slab").field(err).finish(),
            Error::Host(size) => f.debug_tuple("Host").field(size).finish(),
            Error::ForeignPointer => f.write_str("ForeignPointer"),
        }
    }
}

impl<B: BaseAlloc> fmt::Display for Error<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Slab(err) => write!(f, "failed to acquire a chunk slab: {err}"),
            Error::Host(size) => write!(f, "host allocator failed to serve {size} bytes"),
            Error::ForeignPointer => f.write_str("pointer not owned by any chunk"),
        }
    }
}

#[cfg(feature = "std")]
impl<B: BaseAlloc> std::error::Error for Error<B> {}

pub(crate) fn log_error<B: BaseAlloc>(err: &Error<B>) {
    #[cfg(feature = "error-log")]
    log::error!("polloc: {err}");
    #[cfg(not(feature = "error-log"))]
    let _ = err;
}
