use super::arena::{ChunkHandle, PageArena, unpack_class, unpack_index};

/// The adjacency lists produced by one rebuild.
///
/// Entries are packed `u32` values: the low 30 bits are the neighbor atom
/// index, the two high bits its special-bonds class (or the contact-history
/// flag for size-based lists). Use [`NeighborList::neighbors`] for the raw
/// entries and [`NeighborList::decoded`] to split them.
///
/// A list is immutable once built: it stays valid, unchanged, until the next
/// reneighbor event replaces it wholesale. There is no partially-built state.
#[derive(Debug, Clone)]
pub struct NeighborList {
    /// entry storage; one arena per parallel build range
    pub(crate) arenas: Vec<PageArena>,
    /// per reference atom: owning arena and chunk
    pub(crate) handles: Vec<(u32, ChunkHandle)>,
    /// indices of the atoms having a list, owned atoms first
    pub(crate) ilist: Vec<usize>,
    /// number of owned atoms with lists built
    pub(crate) inum: usize,
    /// number of ghost atoms with lists built (ghost-inclusive variants)
    pub(crate) gnum: usize,
}

impl NeighborList {
    /// Number of owned atoms with lists built
    pub fn inum(&self) -> usize {
        self.inum
    }

    /// Number of ghost atoms with lists built
    pub fn gnum(&self) -> usize {
        self.gnum
    }

    /// Indices of the atoms having a list, owned atoms first
    pub fn ilist(&self) -> &[usize] {
        &self.ilist
    }

    /// Number of neighbors of atom `i`
    pub fn count(&self, i: usize) -> usize {
        self.handles[i].1.len as usize
    }

    /// Raw packed entries for atom `i`, empty for atoms without a list
    pub fn neighbors(&self, i: usize) -> &[u32] {
        let (arena, handle) = self.handles[i];
        self.arenas[arena as usize].chunk(handle)
    }

    /// Entries for atom `i`, decoded as `(neighbor index, class)` pairs
    pub fn decoded(&self, i: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.neighbors(i).iter().map(|&entry| (unpack_index(entry), unpack_class(entry)))
    }

    /// Total number of entries over all atoms
    pub fn total_entries(&self) -> usize {
        self.ilist.iter().map(|&i| self.count(i)).sum()
    }
}
