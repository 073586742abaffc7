//! Thread-to-heap routing.
//!
//! Each thread is mapped to a thread-heap index once, at first touch, and
//! the result is cached in thread-local storage, mirroring the source's
//! `thread_local const THREAD_ID` and the teacher crate's
//! `thread_local! { static CACHE: ... }` pattern for per-thread state.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

thread_local! {
    static HEAP_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// The thread-heap index for the calling thread, in `0..heap_count`.
pub fn for_current_thread(heap_count: usize) -> usize {
    HEAP_ID.with(|cell| {
        if let Some(id) = cell.get() {
            return id;
        }

        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let id = (hasher.finish() as usize) % heap_count;

        cell.set(Some(id));
        id
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_repeated_calls() {
        let first = for_current_thread(8);
        let second = for_current_thread(8);
        assert_eq!(first, second);
    }

    #[test]
    fn within_range() {
        let id = for_current_thread(4);
        assert!(id < 4);
    }
}
