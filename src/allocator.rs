//! Allocator implementations.

pub mod hoard;
