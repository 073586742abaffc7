#![deny(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(rust_2018_idioms)]
//! A multi-threaded, Hoard-style general-purpose memory allocator.
//!
//! Allocations are routed to a thread-affine heap made up of size-classed
//! `Basket`s of fixed-size `Superblock`s. A shared global heap acts as the
//! overflow/reclamation tier: underused superblocks migrate back to it so
//! other threads can reuse them instead of pulling fresh memory from the
//! system allocator.
//!
//! # Example
//! ```
//! use hoardalloc::Allocator;
//!
//! #[global_allocator]
//! static ALLOCATOR: Allocator = Allocator::new();
//!
//! let v: Vec<u8> = vec![1, 2, 3];
//! assert_eq!(v.len(), 3);
//! ```

pub mod allocator;

pub use allocator::hoard::Allocator;
