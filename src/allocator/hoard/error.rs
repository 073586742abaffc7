//! The crate-internal error surface.
//!
//! Nothing below [`Allocator::allocate`](super::Allocator::allocate) panics
//! on an out-of-memory condition; superblock and heap construction report
//! failure through [`AllocError`] instead, and the public boundary collapses
//! it to a null pointer per the `allocate`/`deallocate` contract.

/// Failure modes internal to superblock and heap management.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The system allocator refused to hand back memory for a new superblock.
    #[error("system allocator failed to provide {requested} bytes for a new superblock")]
    SystemAllocation {
        /// The number of bytes that were requested from the system allocator.
        requested: usize,
    },
}
