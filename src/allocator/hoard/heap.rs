//! An array of size-classed baskets guarded by a single mutex.

use parking_lot::{Mutex, MutexGuard};

use super::basket::Basket;
use super::size_classes;

/// `size_classes::size_class_count()` baskets, one per size class, behind
/// one mutex. No operation on a heap blocks on another heap; cross-heap
/// coordination only ever happens by one side releasing its lock before
/// taking the other's (§5 lock ordering).
#[derive(Debug)]
pub struct Heap {
    baskets: Mutex<[Basket; size_classes::size_class_count()]>,
}

impl Heap {
    /// An empty heap: every basket starts with no superblocks.
    pub const fn new() -> Self {
        // `Basket` isn't `Copy` (it owns `Vec`s), so the array is spelled out
        // element-by-element rather than via a repeat expression, mirroring
        // how the teacher crate builds its own per-size-class array.
        let baskets: [Basket; size_classes::size_class_count()] = [
            Basket::new(),
            Basket::new(),
            Basket::new(),
            Basket::new(),
            Basket::new(),
            Basket::new(),
            Basket::new(),
            Basket::new(),
            Basket::new(),
        ];

        Self {
            baskets: Mutex::new(baskets),
        }
    }

    /// Locks this heap, returning the guard over all of its baskets.
    ///
    /// Per the lock-ordering protocol (§5), a thread heap's lock must be
    /// acquired before the global heap's, and released before acquiring any
    /// other thread heap's.
    pub fn lock(&self) -> MutexGuard<'_, [Basket; size_classes::size_class_count()]> {
        self.baskets.lock()
    }
}

/// The basket index within a locked heap whose size class is the smallest
/// power of two `>= size`, or `None` if `size` belongs on the large path.
pub fn basket_index_for(size: usize) -> Option<usize> {
    size_classes::index_for(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_heap_has_empty_baskets() {
        let heap = Heap::new();
        let guard = heap.lock();
        for basket in guard.iter() {
            assert_eq!(basket.bytes_allocated(), 0);
            assert_eq!(basket.bytes_used(), 0);
        }
    }

    #[test]
    fn basket_index_matches_size_class() {
        assert_eq!(basket_index_for(1), Some(0));
        assert_eq!(basket_index_for(8192 / 2), Some(8));
        assert_eq!(basket_index_for(8192 / 2 + 1), None);
    }
}
