//! A multi-threaded, Hoard-style allocator.
//!
//! # Internal design
//! ## Thread-affine heaps
//! Each thread is mapped to one of `HEAP_COUNT` heaps at first touch (§4.7);
//! most allocations and frees only ever take that single heap's lock.
//!
//! ## Global heap
//! One extra heap, identical in structure, acts as the overflow and
//! reclamation tier: a thread heap whose basket has too much slack migrates
//! one superblock back to it (§4.5), and a thread heap that misses locally
//! checks it before asking the system allocator for a fresh superblock
//! (§4.4).
//!
//! # References
//! * Hoard: A Scalable Memory Allocator for Multithreaded Applications (Berger et al.)

use std::alloc::{self, GlobalAlloc, Layout};
use std::mem;
use std::ptr::NonNull;
use std::sync::OnceLock;

mod basket;
mod error;
mod header;
mod heap;
mod size_classes;
mod superblock;
mod thread_id;

use basket::Basket;
use error::AllocError;
use heap::Heap;
use superblock::Superblock;

/// Size in bytes of one superblock (two typical memory pages).
pub const SUPERBLOCK_SIZE: usize = 8192;
/// Smallest block size any basket hands out.
pub const MIN_BLOCK_SIZE: usize = 16;
/// How many superblocks' worth of slack a thread-heap basket may retain
/// before a deallocation is eligible to migrate one back to the global heap.
const MIGRATION_SLACK_SUPERBLOCKS: usize = 4;

/// Sentinel `owner_heap_id` meaning "the global heap", distinct from every
/// thread-heap index. `HEAP_COUNT` is only known at runtime (it scales with
/// `std::thread::available_parallelism()`), so unlike the source's
/// `HEAP_COUNT`-valued sentinel this uses a value no real heap count will
/// ever reach (see DESIGN.md).
const GLOBAL_HEAP_ID: usize = usize::MAX;

fn heap_count() -> usize {
    2 * std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// The multi-threaded Hoard-style allocator.
///
/// All instances share nothing with each other (unlike the teacher crate's
/// `lrmalloc::Allocator`, which shares a process-wide page map); each
/// `Allocator` owns its own set of heaps, so it is safe to use more than one
/// instance, though the usual case is a single `'static` instance installed
/// with `#[global_allocator]`.
pub struct Allocator {
    thread_heaps: OnceLock<Box<[Heap]>>,
    global_heap: Heap,
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field(
                "heap_count",
                &self.thread_heaps.get().map_or(0, |h| h.len()),
            )
            .finish()
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator {
    /// Creates a new, empty allocator instance.
    ///
    /// Per-thread heaps are allocated lazily on first use (their count
    /// depends on `std::thread::available_parallelism()`, which cannot be
    /// evaluated in a `const` context), so this remains a `const fn` and the
    /// allocator can be used as a `'static` item, e.g. behind
    /// `#[global_allocator]`.
    pub const fn new() -> Self {
        Self {
            thread_heaps: OnceLock::new(),
            global_heap: Heap::new(),
        }
    }

    fn thread_heaps(&self) -> &[Heap] {
        self.thread_heaps.get_or_init(|| {
            let count = heap_count();
            (0..count).map(|_| Heap::new()).collect()
        })
    }

    /// Allocates at least `n` bytes, aligned to pointer width, or returns
    /// null on out-of-memory.
    pub fn allocate(&self, n: usize) -> *mut u8 {
        let total = match n.checked_add(header::HEADER_SIZE) {
            Some(total) => total,
            None => return std::ptr::null_mut(),
        };

        if total >= SUPERBLOCK_SIZE / 2 {
            return self.allocate_large(total);
        }

        let heaps = self.thread_heaps();
        let heap_id = thread_id::for_current_thread(heaps.len());
        let index = size_classes::index_for(total)
            .expect("total was checked against the large-path threshold above");

        tracing::trace!(total, heap_id, size_class = index, "routing small allocation");

        let mut guard = heaps[heap_id].lock();

        let (mut sb, block) = match guard[index].take_block() {
            Some(hit) => hit,
            None => match self.refill_from_global(&mut guard[index], index, heap_id) {
                Some(sb) => {
                    let block = sb
                        .allocate_block()
                        .expect("a freshly obtained superblock always has a free block");
                    (sb, block)
                }
                None => return std::ptr::null_mut(),
            },
        };

        guard[index].inc_used(sb.block_size());
        let sb_ptr = NonNull::from(sb.as_ref());
        guard[index].add_superblock(sb);
        drop(guard);

        unsafe { header::write(block.as_ptr(), Some(sb_ptr)) }
    }

    /// Tries the global heap's basket for this size class, migrating a
    /// parked superblock into `basket` if one is available, or creating a
    /// fresh superblock otherwise. Returns `None` only on system-allocator
    /// failure.
    fn refill_from_global(
        &self,
        basket: &mut Basket,
        index: usize,
        heap_id: usize,
    ) -> Option<Box<Superblock>> {
        let mut gguard = self.global_heap.lock();

        if let Some(sb) = gguard[index].take_partial_superblock() {
            // `take_partial_superblock` already removed `sb`'s contribution
            // from the global basket's counters; fold its pre-migration
            // `used_bytes` into the receiving basket now, separately from
            // the not-yet-taken block this call's caller accounts for next
            // (§9 open question: the two updates are kept apart).
            basket.inc_allocated(SUPERBLOCK_SIZE);
            basket.inc_used(sb.used_bytes());
            sb.set_owner_heap_id(heap_id);
            drop(gguard);

            tracing::debug!(heap_id, size_class = index, "migrated superblock from global heap");
            return Some(sb);
        }
        drop(gguard);

        basket.inc_allocated(SUPERBLOCK_SIZE);
        match Superblock::new(size_classes::block_size(index), heap_id) {
            Ok(sb) => Some(Box::new(sb)),
            Err(AllocError::SystemAllocation { requested }) => {
                basket.dec_allocated(SUPERBLOCK_SIZE);
                tracing::debug!(requested, "system allocator failed to provide a new superblock");
                None
            }
        }
    }

    fn allocate_large(&self, total: usize) -> *mut u8 {
        let reserved = match header::LARGE_PREFIX_SIZE.checked_add(total) {
            Some(reserved) => reserved,
            None => return std::ptr::null_mut(),
        };
        let layout = match Layout::from_size_align(reserved, mem::align_of::<usize>()) {
            Ok(layout) => layout,
            Err(_) => return std::ptr::null_mut(),
        };

        let raw = unsafe { alloc::alloc(layout) };
        if raw.is_null() {
            return std::ptr::null_mut();
        }

        unsafe { header::write_large(raw, reserved) }
    }

    /// Deallocates a pointer previously returned by [`allocate`](Self::allocate).
    ///
    /// # Panics
    /// Panics if `p` is null. Passing a pointer not returned by this
    /// allocator, or already freed, is undefined behavior (not detected).
    pub fn deallocate(&self, p: *mut u8) {
        assert!(!p.is_null(), "deallocate called with a null pointer");

        let owner = unsafe { header::read(p) };
        let sb_ptr = match owner {
            Some(sb_ptr) => sb_ptr,
            None => return self.deallocate_large(p),
        };

        let block_ptr =
            NonNull::new(unsafe { header::base_of(p) }).expect("header::write never yields null");

        let heaps = self.thread_heaps();
        let (is_global, mut guard) = loop {
            let observed = unsafe { sb_ptr.as_ref() }.owner_heap_id();
            let is_global = observed == GLOBAL_HEAP_ID;
            let guard = if is_global {
                self.global_heap.lock()
            } else {
                heaps[observed].lock()
            };

            // Re-read after locking: the superblock may have migrated
            // between the first read and the lock acquisition (§5 "the
            // deallocation race"). If it's still the heap we locked, we're
            // holding the right mutex; otherwise retry with the new owner.
            if unsafe { sb_ptr.as_ref() }.owner_heap_id() == observed {
                break (is_global, guard);
            }
        };

        debug_assert!(
            unsafe { sb_ptr.as_ref() }.contains(block_ptr),
            "header points at a superblock that does not own this block"
        );

        let block_size = unsafe { sb_ptr.as_ref() }.block_size();
        let index = size_classes::index_for(block_size)
            .expect("block_size always corresponds to a valid size class");

        guard[index].dec_used(block_size);
        guard[index].release_block(sb_ptr, block_ptr);

        if is_global {
            return;
        }

        maybe_migrate_to_global(&mut guard[index], index, &self.global_heap);
    }

    fn deallocate_large(&self, p: *mut u8) {
        let reserved = unsafe { header::read_large_size(p) };
        let base = unsafe { header::large_base_of(p) };
        let layout = Layout::from_size_align(reserved, mem::align_of::<usize>())
            .expect("the layout used at allocate_large time was already valid");

        unsafe { alloc::dealloc(base, layout) };
    }
}

/// The Hoard fullness check (§4.5 step 4): a thread-heap basket may hold
/// `MIGRATION_SLACK_SUPERBLOCKS` superblocks' worth of unused capacity, but
/// once it also drops under 75% used, one superblock is evicted to the
/// global heap so another thread can reuse it.
fn maybe_migrate_to_global(basket: &mut Basket, index: usize, global_heap: &Heap) {
    let allocated = basket.bytes_allocated();
    let used = basket.bytes_used();

    let has_slack = used < allocated.saturating_sub(MIGRATION_SLACK_SUPERBLOCKS * SUPERBLOCK_SIZE);
    let below_threshold = 4 * used < 3 * allocated;

    if !(has_slack && below_threshold) {
        return;
    }

    let Some(sb) = basket.take_partial_superblock() else {
        return;
    };
    sb.set_owner_heap_id(GLOBAL_HEAP_ID);

    tracing::debug!(size_class = index, "migrating superblock to global heap");

    // Same nested lock order as allocation (thread heap, then global): we
    // still hold the thread heap's lock here, so we take the global lock
    // next rather than releasing first (§5 lock ordering).
    let mut gguard = global_heap.lock();
    gguard[index].inc_allocated(SUPERBLOCK_SIZE);
    gguard[index].inc_used(sb.used_bytes());
    gguard[index].add_superblock(sb);
}

unsafe impl GlobalAlloc for Allocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > mem::align_of::<usize>() {
            // We only guarantee pointer alignment (§4.1); anything stronger
            // falls straight onto the system allocator, which can honor it.
            return unsafe { alloc::alloc(layout) };
        }
        self.allocate(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.align() > mem::align_of::<usize>() {
            unsafe { alloc::dealloc(ptr, layout) };
            return;
        }
        self.deallocate(ptr)
    }
}
