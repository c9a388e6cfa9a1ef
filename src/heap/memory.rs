//! Backing memory providers for the heap.
//!
//! The heap core never talks to the operating system itself. It only needs a
//! contiguous byte region that can grow at its high end, abstracted by the
//! [`Memory`] trait. Two providers are offered:
//!
//! - [`Arena`]: a fixed-capacity buffer embedded in the provider itself.
//!   This is the provider used by the global [`Allocator`](crate::Allocator)
//!   and by the test suite, since it needs no operating system at all.
//! - [`SystemBreak`] (feature `sbrk`): the classic Unix program break, grown
//!   with `sbrk(2)`.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use super::ALIGNMENT;

/// A contiguous byte region that can only grow at its high end.
///
/// The region starts empty. [`extend`](Memory::extend) maps `n` more bytes
/// and returns the offset of the first new byte, so the first call returns 0,
/// the next one the previous request size and so on. The base address must
/// not change over the lifetime of the provider and must be aligned to
/// [`ALIGNMENT`](crate::heap::ALIGNMENT) bytes.
///
/// The mapped bytes are treated as uninitialized storage: the heap reads only
/// words it has written before.
pub trait Memory {
    /// The base address of the region.
    ///
    /// The returned pointer is valid for reads and writes of
    /// [`size()`](Memory::size) bytes. It is only dereferenced by the heap,
    /// never exposed to safe code directly.
    fn base(&self) -> *mut u8;

    /// The number of currently mapped bytes.
    fn size(&self) -> usize;

    /// Grow the region by `n` bytes (a multiple of 8).
    ///
    /// On success the offset of the first new byte is returned. `None` means
    /// the request cannot be satisfied; the region is unchanged in that case.
    fn extend(&mut self, n: usize) -> Option<u32>;
}

/// Backing storage of an [`Arena`], aligned like the strictest payload.
#[repr(align(8))]
struct Bytes<const N: usize>([MaybeUninit<u8>; N]);

/// A fixed-capacity in-memory provider.
///
/// The full capacity `N` is part of the value itself, so an `Arena` placed in
/// a `static` reserves its heap in the `.bss` section at link time. The
/// break starts at 0 and moves towards `N` as the heap extends.
pub struct Arena<const N: usize> {
    bytes: UnsafeCell<Bytes<N>>,
    brk: usize,
}
impl<const N: usize> Arena<N> {
    /// Create a new, fully unmapped arena.
    ///
    /// # Panics
    /// This function panics if the capacity is not a multiple of 8.
    pub const fn new() -> Self {
        assert!(N % ALIGNMENT == 0, "memory size has to be divisible by 8");
        Self {
            bytes: UnsafeCell::new(Bytes([MaybeUninit::uninit(); N])),
            brk: 0,
        }
    }
}
impl<const N: usize> Memory for Arena<N> {
    fn base(&self) -> *mut u8 {
        // the pointer is derived from the `UnsafeCell`, so writes through it
        // are permitted even while the arena itself is borrowed
        self.bytes.get().cast::<u8>()
    }

    fn size(&self) -> usize {
        self.brk
    }

    fn extend(&mut self, n: usize) -> Option<u32> {
        debug_assert!(n % ALIGNMENT == 0);
        if self.brk + n > N {
            return None;
        }
        let offset = self.brk as u32;
        self.brk += n;
        Some(offset)
    }
}

/// The Unix program break, grown with `sbrk(2)`.
///
/// The process owns a single break, so at most one `SystemBreak` must be live
/// at a time, and nothing else in the process may move the break behind its
/// back. If a foreign `sbrk`/`brk` call is detected (the break no longer ends
/// where this provider left it), further growth is refused rather than
/// handing out a region with a hole in it.
#[cfg(feature = "sbrk")]
pub struct SystemBreak {
    base: *mut u8,
    size: usize,
}

#[cfg(feature = "sbrk")]
impl SystemBreak {
    /// `sbrk` reports failure by returning `(void*)-1`.
    const FAILED: *mut libc::c_void = usize::MAX as *mut libc::c_void;

    /// Create a provider over the current program break.
    ///
    /// No system call happens here; the break is first probed (and aligned
    /// upwards to 8 bytes) when the heap extends for the first time.
    pub const fn new() -> Self {
        Self {
            base: core::ptr::null_mut(),
            size: 0,
        }
    }
}

// SAFETY: the provider only wraps the process-wide break, which exists
// independently of the thread using it; exclusive access is the caller's
// obligation (stated above), not a property of the pointer field.
#[cfg(feature = "sbrk")]
unsafe impl Send for SystemBreak {}

#[cfg(feature = "sbrk")]
impl Memory for SystemBreak {
    fn base(&self) -> *mut u8 {
        self.base
    }

    fn size(&self) -> usize {
        self.size
    }

    fn extend(&mut self, n: usize) -> Option<u32> {
        debug_assert!(n % ALIGNMENT == 0);
        if self.base.is_null() {
            // first growth: align the inherited break up to 8 bytes
            // SAFETY: sbrk(0) only reads the current break
            let brk = unsafe { libc::sbrk(0) };
            if brk == Self::FAILED {
                return None;
            }
            let misalignment = brk as usize % ALIGNMENT;
            let padding = if misalignment == 0 {
                0
            } else {
                ALIGNMENT - misalignment
            };
            // SAFETY: moves the break forward by less than one alignment unit
            if padding != 0 && unsafe { libc::sbrk(padding as libc::intptr_t) } == Self::FAILED {
                return None;
            }
            self.base = (brk as usize + padding) as *mut u8;
        }

        // SAFETY: grows the data segment; the kernel refuses on exhaustion
        let old = unsafe { libc::sbrk(n as libc::intptr_t) };
        if old == Self::FAILED {
            return None;
        }
        if old.cast::<u8>() != (self.base as usize + self.size) as *mut u8 {
            // someone else moved the break since the last extension; the new
            // bytes are not contiguous with the region, so give them up
            return None;
        }
        let offset = self.size as u32;
        self.size += n;
        Some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::{Arena, Memory, ALIGNMENT};

    #[test]
    fn arena_starts_unmapped() {
        let arena = Arena::<64>::new();
        assert_eq!(arena.size(), 0);
    }

    #[test]
    fn arena_base_is_aligned() {
        let arena = Arena::<64>::new();
        assert_eq!(arena.base() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn arena_extension_is_monotonic() {
        let mut arena = Arena::<64>::new();
        assert_eq!(arena.extend(16), Some(0));
        assert_eq!(arena.extend(40), Some(16));
        assert_eq!(arena.size(), 56);
    }

    #[test]
    fn arena_refuses_growth_past_its_capacity() {
        let mut arena = Arena::<32>::new();
        assert_eq!(arena.extend(24), Some(0));
        assert_eq!(arena.extend(16), None);
        // a refused extension leaves the break untouched
        assert_eq!(arena.size(), 24);
        assert_eq!(arena.extend(8), Some(24));
    }

    #[test]
    fn arena_bytes_are_writable_up_to_the_break() {
        let mut arena = Arena::<32>::new();
        arena.extend(32).unwrap();
        // SAFETY: the whole capacity is mapped and exclusively owned
        unsafe {
            arena.base().write_bytes(0xa5, 32);
            assert_eq!(arena.base().add(31).read(), 0xa5);
        }
    }

    #[cfg(feature = "sbrk")]
    #[test]
    fn system_break_extends_contiguously() {
        use super::SystemBreak;

        let mut brk = SystemBreak::new();
        let first = brk.extend(64).unwrap();
        assert_eq!(first, 0);
        assert_eq!(brk.base() as usize % ALIGNMENT, 0);
        // SAFETY: the 64 bytes starting at the base were just mapped
        unsafe {
            brk.base().write_bytes(0x5a, 64);
            assert_eq!(brk.base().add(63).read(), 0x5a);
        }
    }
}
