//! Consistency checking for the heap structure.
//!
//! The checker walks the physical block sequence and the segregated lists
//! and cross-checks them. It is meant for tests and for debugging sessions;
//! none of the allocation paths depend on it.

use super::{bin_index, Heap, Memory, BIN_COUNT, DSIZE, FIRST_BLOCK, MIN_BLOCK, PROLOGUE, WSIZE};

/// A violation of the heap structure found by [`Heap::check`].
///
/// Offsets are relative to the heap base, like the link words in the heap
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// The prologue sentinel is missing or was overwritten.
    BadPrologue,
    /// The epilogue sentinel is missing, not allocated or not at the end of
    /// the mapped region.
    BadEpilogue,
    /// A block has a size below the minimum or off the 8-byte granularity.
    MisalignedBlock { offset: u32 },
    /// A block reaches past the end of the mapped region.
    OutOfRange { offset: u32 },
    /// A free block whose footer does not match its header.
    TagMismatch { offset: u32 },
    /// A header whose cached neighbor state contradicts the actual
    /// allocation state of the preceding block.
    BadNeighborBit { offset: u32 },
    /// Two physically adjacent free blocks, which eager coalescing should
    /// have merged.
    AdjacentFreeBlocks { offset: u32 },
    /// A size-class list contains a node that is allocated, sits in the
    /// wrong class, has a broken back link or forms a cycle.
    BadFreeList { bin: usize, offset: u32 },
    /// The number of free blocks in the physical sequence differs from the
    /// number of nodes on the size-class lists.
    FreeCountMismatch { walked: u32, listed: u32 },
}

impl<M: Memory> Heap<M> {
    /// Validate the complete heap structure.
    ///
    /// Walks every block from prologue to epilogue, then every size-class
    /// list, and returns the first violation found. An unmapped heap is
    /// trivially consistent.
    pub fn check(&self) -> Result<(), CheckError> {
        if self.memory.size() == 0 {
            return Ok(());
        }
        let end = self.memory.size() as u32;

        let prologue = self.tag_at(Self::header(PROLOGUE));
        if prologue.size() != DSIZE
            || !prologue.is_allocated()
            || self.tag_at(PROLOGUE) != prologue
        {
            return Err(CheckError::BadPrologue);
        }

        // physical walk, tracking the allocation state of the previous block
        // and counting free blocks for the list cross-check below
        let mut walked = 0u32;
        let mut bp = FIRST_BLOCK;
        let mut prev_allocated = true;
        let mut prev_free = false;
        loop {
            if Self::header(bp) + WSIZE > end {
                return Err(CheckError::OutOfRange { offset: bp });
            }
            let header = self.tag_at(Self::header(bp));
            if header.size() == 0 {
                if !header.is_allocated() || Self::header(bp) != end - WSIZE {
                    return Err(CheckError::BadEpilogue);
                }
                if header.prev_allocated() != prev_allocated {
                    return Err(CheckError::BadNeighborBit { offset: bp });
                }
                break;
            }

            let size = header.size();
            if size < MIN_BLOCK || size % DSIZE != 0 {
                return Err(CheckError::MisalignedBlock { offset: bp });
            }
            if bp as u64 + size as u64 > end as u64 {
                return Err(CheckError::OutOfRange { offset: bp });
            }
            if header.prev_allocated() != prev_allocated {
                return Err(CheckError::BadNeighborBit { offset: bp });
            }
            if header.is_allocated() {
                prev_free = false;
            } else {
                if prev_free {
                    return Err(CheckError::AdjacentFreeBlocks { offset: bp });
                }
                if self.tag_at(bp + size - DSIZE) != header {
                    return Err(CheckError::TagMismatch { offset: bp });
                }
                walked += 1;
                prev_free = true;
            }
            prev_allocated = header.is_allocated();
            bp += size;
        }

        // list walk: every node must be a free block of the right class,
        // linked back to its predecessor
        let mut listed = 0u32;
        let node_limit = end / MIN_BLOCK + 1;
        for bin in 0..BIN_COUNT {
            let mut node = self.bin_head(bin);
            let mut prev = 0u32;
            let mut steps = 0u32;
            while node != 0 {
                steps += 1;
                let out_of_range = node < FIRST_BLOCK || node >= end || node % DSIZE != 0;
                if steps > node_limit || out_of_range {
                    return Err(CheckError::BadFreeList { bin, offset: node });
                }
                let header = self.tag_at(Self::header(node));
                if header.is_allocated()
                    || bin_index(header.size()) != bin
                    || self.link_prev(node) != prev
                {
                    return Err(CheckError::BadFreeList { bin, offset: node });
                }
                listed += 1;
                prev = node;
                node = self.link_next(node);
            }
        }
        if walked != listed {
            return Err(CheckError::FreeCountMismatch { walked, listed });
        }
        Ok(())
    }

    /// Walk the heap and report problems through the [`log`] facade.
    ///
    /// With `verbose` set, every block is dumped at debug level on the way.
    /// Violations are reported at error level; the heap is left untouched
    /// either way. Do not call this from inside a global-allocation path:
    /// a logging sink that itself allocates would re-enter the allocator.
    pub fn check_heap(&self, verbose: bool) {
        if self.memory.size() == 0 {
            if verbose {
                log::debug!("heap: unmapped");
            }
            return;
        }
        if verbose {
            let end = self.memory.size() as u32;
            log::debug!("heap: {} bytes mapped", end);
            let mut bp = FIRST_BLOCK;
            while Self::header(bp) + WSIZE <= end {
                let header = self.tag_at(Self::header(bp));
                if header.size() == 0 {
                    log::debug!("{:#x}: epilogue", bp);
                    break;
                }
                log::debug!(
                    "{:#x}: {} bytes, {}",
                    bp,
                    header.size(),
                    if header.is_allocated() { "allocated" } else { "free" }
                );
                if header.size() < MIN_BLOCK || header.size() % DSIZE != 0 {
                    // the sizes no longer chain, the walk is lost
                    break;
                }
                bp += header.size();
            }
        }
        if let Err(error) = self.check() {
            log::error!("heap check failed: {:?}", error);
        }
    }
}
