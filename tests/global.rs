//! The `GlobalAlloc` interface of a local allocator instance.
use std::alloc::{GlobalAlloc as _, Layout};
use std::ptr;

/// 16 bytes of sentinels and a single free block of 240 bytes.
type Small = tagalloc::Allocator<256>;

fn fill(ptr: *mut u8, len: usize, byte: u8) {
    unsafe { ptr::write_bytes(ptr, byte, len) };
}

fn contents(ptr: *mut u8, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
}

#[test]
fn earlier_allocations_stay_writable() {
    let allocator = tagalloc::Allocator::<4096>::new();
    let layout = Layout::new::<u64>();
    unsafe {
        let a = allocator.alloc(layout).cast::<u64>();
        a.write(1);
        let b = allocator.alloc(layout).cast::<u64>();
        b.write(3);
        a.write(2);
        assert_eq!(a.read(), 2);
        assert_eq!(b.read(), 3);
        allocator.dealloc(b.cast(), layout);
        allocator.dealloc(a.cast(), layout);
    }
}

#[test]
fn realloc_moves_into_fresh_block() {
    let allocator = tagalloc::Allocator::<4096>::new();
    let layout = Layout::from_size_align(8, 8).unwrap();
    unsafe {
        let a = allocator.alloc(layout);
        fill(a, 8, 0x5a);

        let b = allocator.realloc(a, layout, 64);
        assert!(!b.is_null());
        assert_ne!(a, b);
        assert_eq!(contents(b, 8), [0x5a; 8]);
        allocator.dealloc(b, Layout::from_size_align(64, 8).unwrap());
    }
}

#[test]
fn failed_realloc_keeps_old_block() {
    let allocator = Small::new();
    let layout = Layout::from_size_align(16, 8).unwrap();
    unsafe {
        let a = allocator.alloc(layout);
        fill(a, 16, 0x33);

        assert!(allocator.realloc(a, layout, 1024).is_null());
        assert_eq!(contents(a, 16), [0x33; 16]);
        allocator.dealloc(a, layout);
    }
}

#[test]
fn dealloc_after_realloc_releases_everything() {
    let allocator = Small::new();
    let layout = Layout::from_size_align(16, 8).unwrap();
    unsafe {
        let a = allocator.alloc(layout);
        let b = allocator.realloc(a, layout, 100);
        assert!(!b.is_null());
        allocator.dealloc(b, Layout::from_size_align(100, 8).unwrap());

        // the whole heap is a single free block again: 240 - 8 bytes payload
        let whole = Layout::from_size_align(232, 8).unwrap();
        let c = allocator.alloc(whole);
        assert!(!c.is_null());
        assert!(allocator.alloc(layout).is_null(), "heap is exhausted");
        allocator.dealloc(c, whole);
    }
}

#[test]
fn large_alignments_are_served() {
    let allocator = tagalloc::Allocator::<65536>::new();
    let mut blocks = Vec::new();
    for align in [16, 32, 64, 128, 4096] {
        let layout = Layout::from_size_align(148, align).unwrap();
        let ptr = unsafe { allocator.alloc(layout) };
        assert!(!ptr.is_null(), "alignment {}", align);
        assert_eq!(ptr as usize % align, 0, "alignment {}", align);
        fill(ptr, 148, align as u8);
        blocks.push((ptr, layout));
    }

    for &(ptr, layout) in &blocks {
        assert!(contents(ptr, 148).iter().all(|&byte| byte == layout.align() as u8));
    }
    for (ptr, layout) in blocks {
        unsafe { allocator.dealloc(ptr, layout) };
    }

    // the heap grew once to 16 + 4096 + 4256 bytes for the last request and
    // is a single free block of 8352 bytes again
    let whole = Layout::from_size_align(8352 - 8, 8).unwrap();
    let ptr = unsafe { allocator.alloc(whole) };
    assert!(!ptr.is_null());
}

#[test]
fn realloc_keeps_large_alignment() {
    let allocator = tagalloc::Allocator::<4096>::new();
    let layout = Layout::from_size_align(24, 32).unwrap();
    unsafe {
        let a = allocator.alloc(layout);
        fill(a, 24, 0x77);

        let b = allocator.realloc(a, layout, 200);
        assert!(!b.is_null());
        assert_eq!(b as usize % 32, 0);
        assert_eq!(contents(b, 24), [0x77; 24]);

        let c = allocator.realloc(b, Layout::from_size_align(200, 32).unwrap(), 8);
        assert_eq!(c as usize % 32, 0);
        assert_eq!(contents(c, 8), [0x77; 8]);
        allocator.dealloc(c, Layout::from_size_align(8, 32).unwrap());
    }
}

#[test]
fn exhausted_heap_returns_null() {
    let allocator = Small::new();
    let layout = Layout::from_size_align(512, 8).unwrap();
    assert!(unsafe { allocator.alloc(layout) }.is_null());
    let layout = Layout::from_size_align(8, 16).unwrap();
    assert!(!unsafe { allocator.alloc(layout) }.is_null());
}
