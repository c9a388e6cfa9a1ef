#[test]
fn is_usable_in_const_contexts() {
    const _ALLOCATOR1: segfit::Allocator<1024> = segfit::Allocator::new();
    static _ALLOCATOR2: segfit::Allocator<1024> = segfit::Allocator::new();
}

#[test]
fn supports_global_alloc() {
    fn assert<T: core::alloc::GlobalAlloc>(_: T) {}
    assert(segfit::Allocator::<1024>::new())
}

#[test]
fn heap_core_is_usable_in_const_contexts() {
    use segfit::heap::{Arena, Heap};
    const _HEAP: Heap<Arena<1024>> = Heap::new(Arena::new());
}

#[test]
#[should_panic(expected = "too small heap memory")]
fn min_heap_size_of_at_least_160() {
    let _allocator = segfit::Allocator::<152>::new(); // panic here
}

#[test]
#[should_panic(expected = "divisible by 8")]
fn heap_size_must_be_a_multiple_of_8() {
    let _allocator = segfit::Allocator::<161>::new(); // panic here
}
