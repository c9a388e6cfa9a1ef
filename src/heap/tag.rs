//! The boundary-tag word written at the edges of every block.
//!
//! A tag is a single 32-bit word. Block sizes are always multiples of
//! 8, so the low three bits of the size are free to carry per-block state:
//! ```text
//! 31                           3   2   1   0
//! ssss ssss ssss ssss ssss ssss s | 0 | P | A
//! ^------------------------------  ^   ^   ^
//! block size in bytes       unused   prev  self
//!                                   alloc  alloc
//! ```
//! Every block starts with a tag (its header). Free blocks additionally end
//! with a copy of the header (their footer), which lets a right neighbor
//! locate the block start in O(1). Allocated blocks have no footer; their
//! right neighbor instead learns about them through the `P` bit, which caches
//! the allocation state of the physically preceding block.

use static_assertions::const_assert_eq;

/// The block is in use by the client.
const SELF_ALLOCATED: u32 = 0b001;
/// The physically preceding block is in use by the client.
const PREV_ALLOCATED: u32 = 0b010;
/// The size occupies the upper bits; bit 2 is reserved and kept zero.
const SIZE_MASK: u32 = !0b111;

// Largest size a single allocation request may occupy. Coalescing may form
// larger free blocks; the word encodes any multiple of 8 up to 2^32 - 8.
pub const MAX_SIZE: u32 = (1 << 29) - 8;
const_assert_eq!(MAX_SIZE & !SIZE_MASK, 0);

/// A header or footer word of a single heap block.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);
impl Tag {
    /// Create a tag describing an allocated block of the given total size.
    ///
    /// `size` includes the header word and must be a multiple of 8 (or zero,
    /// for the epilogue sentinel).
    pub const fn allocated(size: u32, prev_allocated: bool) -> Self {
        debug_assert!(size % 8 == 0);
        Self(size | SELF_ALLOCATED | if prev_allocated { PREV_ALLOCATED } else { 0 })
    }

    /// Create a tag describing a free block of the given total size.
    ///
    /// `size` includes the header and footer words and must be a nonzero
    /// multiple of 8.
    pub const fn free(size: u32, prev_allocated: bool) -> Self {
        debug_assert!(size % 8 == 0 && size != 0);
        Self(size | if prev_allocated { PREV_ALLOCATED } else { 0 })
    }

    /// Reinterpret a word read from the heap as a tag.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw word, as written into the heap.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Total size of the block in bytes, including its tags.
    pub const fn size(self) -> u32 {
        self.0 & SIZE_MASK
    }

    /// Whether the block itself is allocated.
    pub const fn is_allocated(self) -> bool {
        self.0 & SELF_ALLOCATED != 0
    }

    /// Whether the physically preceding block is allocated.
    pub const fn prev_allocated(self) -> bool {
        self.0 & PREV_ALLOCATED != 0
    }

    /// The same tag with the preceding-block bit replaced.
    pub const fn with_prev_allocated(self, prev_allocated: bool) -> Self {
        if prev_allocated {
            Self(self.0 | PREV_ALLOCATED)
        } else {
            Self(self.0 & !PREV_ALLOCATED)
        }
    }
}
impl core::fmt::Debug for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tag")
            .field("size", &self.size())
            .field("allocated", &self.is_allocated())
            .field("prev_allocated", &self.prev_allocated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Tag;

    #[test]
    fn allocated_tags_carry_size_and_flags() {
        let tag = Tag::allocated(48, false);
        assert_eq!(tag.size(), 48);
        assert!(tag.is_allocated());
        assert!(!tag.prev_allocated());

        let tag = Tag::allocated(16, true);
        assert_eq!(tag.as_raw(), 16 | 0b011);
    }

    #[test]
    fn free_tags_carry_size_and_flags() {
        let tag = Tag::free(512, true);
        assert_eq!(tag.size(), 512);
        assert!(!tag.is_allocated());
        assert!(tag.prev_allocated());
        assert_eq!(tag.as_raw(), 512 | 0b010);
    }

    #[test]
    fn epilogue_is_an_allocated_zero_size_tag() {
        let epilogue = Tag::allocated(0, false);
        assert_eq!(epilogue.size(), 0);
        assert!(epilogue.is_allocated());
    }

    #[test]
    fn prev_allocated_bit_can_be_rewritten_in_place() {
        let tag = Tag::free(64, true).with_prev_allocated(false);
        assert_eq!(tag, Tag::free(64, false));
        assert_eq!(tag.with_prev_allocated(true), Tag::free(64, true));
        // rewriting must not disturb the size or the allocation bit
        assert_eq!(tag.with_prev_allocated(true).size(), 64);
        assert!(!tag.with_prev_allocated(true).is_allocated());
    }

    #[test]
    fn round_trips_through_the_raw_representation() {
        let tag = Tag::allocated(1024, true);
        assert_eq!(Tag::from_raw(tag.as_raw()), tag);
    }
}
