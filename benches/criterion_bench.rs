use criterion::{criterion_group, criterion_main};


criterion_group!(
    allocator_benches,
    allocator::hoard::allocate_deallocate,
    allocator::system_alloc::allocate_deallocate,
);

criterion_main!(allocator_benches);
