use crate::Error;

/// Number of bits of a stored neighbor entry used for the atom index. The two
/// bits above it carry the special-bonds class (1-2/1-3/1-4) or, for
/// size-based lists with contact history, the "already in contact" flag.
///
/// This layout is a compatibility contract with the force kernels consuming
/// the lists: `index = entry & ((1 << SBBITS) - 1)`, `class = entry >> SBBITS`.
pub const SBBITS: u32 = 30;

/// Mask extracting the atom index from a packed entry
pub const INDEX_MASK: u32 = (1 << SBBITS) - 1;

/// Largest atom index (local + ghost) which can be stored in a packed entry
pub const MAX_ATOM_INDEX: usize = INDEX_MASK as usize;

/// Class value flagging a size-based pair already in contact
pub const CONTACT_HISTORY: u32 = 3;

/// Pack an atom index and a 2-bit class into a single entry. A class of 0
/// leaves the index unchanged.
#[inline]
pub fn pack(index: usize, class: u32) -> u32 {
    debug_assert!(index <= MAX_ATOM_INDEX);
    debug_assert!(class <= 3);
    (index as u32) ^ (class << SBBITS)
}

/// Get the atom index stored in a packed entry
#[inline]
pub fn unpack_index(entry: u32) -> usize {
    (entry & INDEX_MASK) as usize
}

/// Get the 2-bit class stored in a packed entry (0 when the neighbor is not
/// special)
#[inline]
pub fn unpack_class(entry: u32) -> u32 {
    entry >> SBBITS
}

/// Handle to one atom's run of entries inside a [`PageArena`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkHandle {
    pub page: u32,
    pub offset: u32,
    pub len: u32,
}

/// A paged arena allocator for neighbor entries.
///
/// All entries emitted during one rebuild are packed into reusable
/// fixed-size pages, so that per-atom allocations never hit the heap after
/// the first rebuild. One atom's run of entries never spans two pages: before
/// starting an atom the arena moves to a fresh page if fewer than
/// `max_chunk` entries remain in the current one. An atom emitting more than
/// `max_chunk` entries is a fatal configuration error, reported by
/// [`PageArena::commit`], never a silent truncation.
#[derive(Debug, Clone)]
pub struct PageArena {
    pages: Vec<Box<[u32]>>,
    page_size: usize,
    max_chunk: usize,
    /// page currently written to
    current: usize,
    /// entries used in the current page, up to the start of the open chunk
    used: usize,
    /// entries pushed into the open chunk; may exceed `max_chunk`, in which
    /// case the excess is counted but not written and `commit` reports the
    /// overflow
    staged: usize,
}

impl PageArena {
    /// Create an arena with the given page size (entries per page) and
    /// per-atom chunk capacity.
    pub fn new(page_size: usize, max_chunk: usize) -> Result<PageArena, Error> {
        if max_chunk == 0 || page_size < max_chunk {
            return Err(Error::InvalidParameter(format!(
                "arena page size ({}) must be at least the per-atom capacity ({})",
                page_size, max_chunk
            )));
        }

        return Ok(PageArena {
            pages: vec![vec![0; page_size].into_boxed_slice()],
            page_size: page_size,
            max_chunk: max_chunk,
            current: 0,
            used: 0,
            staged: 0,
        });
    }

    /// Discard all chunks, keeping the allocated pages for reuse
    pub fn reset(&mut self) {
        self.current = 0;
        self.used = 0;
        self.staged = 0;
    }

    /// Start a new chunk, guaranteeing room for `max_chunk` entries
    pub fn begin(&mut self) {
        debug_assert_eq!(self.staged, 0, "previous chunk was not committed");
        if self.page_size - self.used < self.max_chunk {
            self.current += 1;
            self.used = 0;
            if self.current == self.pages.len() {
                self.pages.push(vec![0; self.page_size].into_boxed_slice());
            }
        }
    }

    /// Append an entry to the open chunk. Entries beyond the per-atom
    /// capacity are counted but not stored; `commit` will then fail.
    #[inline]
    pub fn push(&mut self, entry: u32) {
        if self.staged < self.max_chunk {
            self.pages[self.current][self.used + self.staged] = entry;
        }
        self.staged += 1;
    }

    /// Close the open chunk and get a handle to it
    pub fn commit(&mut self) -> Result<ChunkHandle, Error> {
        if self.staged > self.max_chunk {
            let staged = self.staged;
            self.staged = 0;
            return Err(Error::Overflow(format!(
                "one atom has {} neighbors, which overflows the per-atom capacity \
                of {}; rebuild with a larger page size", staged, self.max_chunk
            )));
        }

        let handle = ChunkHandle {
            page: self.current as u32,
            offset: self.used as u32,
            len: self.staged as u32,
        };
        self.used += self.staged;
        self.staged = 0;
        return Ok(handle);
    }

    /// Get the entries of a committed chunk
    pub fn chunk(&self, handle: ChunkHandle) -> &[u32] {
        let page = &self.pages[handle.page as usize];
        &page[handle.offset as usize..(handle.offset + handle.len) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        assert_eq!(pack(42, 0), 42);
        assert_eq!(unpack_index(pack(42, 3)), 42);
        assert_eq!(unpack_class(pack(42, 3)), 3);
        assert_eq!(unpack_class(pack(42, 0)), 0);

        // exact bit layout: class lives in the two bits above SBBITS
        assert_eq!(pack(7, 2), 7 | (2 << 30));
        assert_eq!(unpack_index(pack(MAX_ATOM_INDEX, 1)), MAX_ATOM_INDEX);
    }

    #[test]
    fn chunks() {
        let mut arena = PageArena::new(8, 4).unwrap();

        arena.begin();
        arena.push(1);
        arena.push(2);
        let first = arena.commit().unwrap();
        assert_eq!(arena.chunk(first), [1, 2]);

        arena.begin();
        arena.push(3);
        let second = arena.commit().unwrap();
        assert_eq!(arena.chunk(second), [3]);
        assert_eq!(arena.chunk(first), [1, 2]);
    }

    #[test]
    fn page_rollover() {
        let mut arena = PageArena::new(4, 2).unwrap();

        arena.begin();
        arena.push(1);
        arena.push(2);
        let first = arena.commit().unwrap();

        arena.begin();
        arena.push(3);
        let second = arena.commit().unwrap();

        // 3 of 4 entries used: the next chunk must start on a fresh page
        arena.begin();
        arena.push(4);
        arena.push(5);
        let third = arena.commit().unwrap();

        assert_eq!(first.page, 0);
        assert_eq!(second.page, 0);
        assert_eq!(third.page, 1);
        assert_eq!(arena.chunk(third), [4, 5]);
    }

    #[test]
    fn overflow_is_fatal() {
        let mut arena = PageArena::new(8, 2).unwrap();

        arena.begin();
        arena.push(1);
        arena.push(2);
        arena.push(3);
        let result = arena.commit();
        assert!(matches!(result, Err(Error::Overflow(_))));

        // the arena stays usable after reset
        arena.reset();
        arena.begin();
        arena.push(7);
        let handle = arena.commit().unwrap();
        assert_eq!(arena.chunk(handle), [7]);
    }

    #[test]
    fn invalid_sizes() {
        assert!(matches!(PageArena::new(2, 4), Err(Error::InvalidParameter(_))));
        assert!(matches!(PageArena::new(8, 0), Err(Error::InvalidParameter(_))));
    }
}
