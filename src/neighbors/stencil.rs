use super::bins::BinGrid;

/// Which family of bin offsets a stencil enumerates.
///
/// Stencils are pure functions of the bin geometry, the cutoff and the
/// pairing mode: the atoms currently in the bins never influence them, and
/// they are only recomputed when cutoffs or the box shape change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilShape {
    /// All bins within the cutoff of the reference bin, in every direction.
    /// Used by full lists, and by half lists deferring the pair decision to
    /// an index comparison (Newton off).
    Full,
    /// The reference bin plus the bins "forward" of it under the fixed
    /// (z, then y, then x) total order on bin coordinates. Used by half
    /// Newton-on lists in orthogonal cells, where the per-atom coordinate
    /// tie-break only has to resolve pairs inside the reference bin.
    Half,
    /// Half along z only: all bins with `dz >= 0`, full x/y planes. Used by
    /// half Newton-on lists in triclinic cells, where the coordinate
    /// tie-break is applied to every candidate: an atom higher in z (kept by
    /// the tie-break) can sit in a bin with a lower y or x coordinate, so
    /// those bins must stay in the stencil.
    HalfSkewed,
}

/// A precomputed list of relative bin offsets to search around a reference
/// bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stencil {
    offsets: Vec<[i32; 3]>,
}

impl Stencil {
    /// Build the stencil for the given grid, neighbor cutoff and shape.
    /// `dimension` is 2 or 3; 2D stencils stay in the single z bin layer.
    pub fn new(grid: &BinGrid, cutoff: f64, shape: StencilShape, dimension: usize) -> Stencil {
        let extent = grid.stencil_extent(cutoff, dimension);
        let cutoff2 = cutoff * cutoff;

        let mut offsets = Vec::new();
        for dz in -extent[2]..=extent[2] {
            for dy in -extent[1]..=extent[1] {
                for dx in -extent[0]..=extent[0] {
                    let forward = match shape {
                        StencilShape::Full => true,
                        // forward half space: positive z, or same z plane and
                        // positive y, or same z-y row and non-negative x
                        // (the x == 0 case keeps the reference bin itself)
                        StencilShape::Half => {
                            dz > 0 || (dz == 0 && (dy > 0 || (dy == 0 && dx >= 0)))
                        }
                        StencilShape::HalfSkewed => dz >= 0,
                    };
                    if !forward {
                        continue;
                    }

                    if grid.bin_distance2([dx, dy, dz]) < cutoff2 {
                        offsets.push([dx, dy, dz]);
                    }
                }
            }
        }

        return Stencil { offsets };
    }

    /// The relative bin offsets, in a fixed deterministic order
    pub fn offsets(&self) -> &[[i32; 3]] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// The per-(collection, collection) stencil table.
///
/// With a single collection this holds one stencil. In multi-cutoff mode the
/// (i, j) entry drives the search from an atom of collection i through the
/// bins of collection j, and the cutoff asymmetry decides its shape:
/// - `cutoff_i < cutoff_j`: no stencil, collection j's own (bigger) search
///   already finds these pairs;
/// - `cutoff_i == cutoff_j`: half stencil (half modes) or full (full modes);
/// - `cutoff_i > cutoff_j`: full stencil, collection i owns all these pairs.
#[derive(Debug, Clone)]
pub struct StencilTable {
    ncollections: usize,
    stencils: Vec<Option<Stencil>>,
}

impl StencilTable {
    /// Build the table for a single collection
    pub fn single(grid: &BinGrid, cutoff: f64, shape: StencilShape, dimension: usize) -> StencilTable {
        StencilTable {
            ncollections: 1,
            stencils: vec![Some(Stencil::new(grid, cutoff, shape, dimension))],
        }
    }

    /// Build the full multi-collection table. `grids` and `cutoffs` give the
    /// per-collection bin grid and neighbor cutoff; `shape` is the pairing
    /// family requested for same-cutoff pairs.
    pub fn multi(
        grids: &[BinGrid],
        cutoffs: &[f64],
        shape: StencilShape,
        dimension: usize,
    ) -> StencilTable {
        assert_eq!(grids.len(), cutoffs.len());
        let ncollections = grids.len();

        let mut stencils = Vec::with_capacity(ncollections * ncollections);
        for icoll in 0..ncollections {
            for jcoll in 0..ncollections {
                let stencil = if shape == StencilShape::Full {
                    let cutoff = f64::max(cutoffs[icoll], cutoffs[jcoll]);
                    Some(Stencil::new(&grids[jcoll], cutoff, StencilShape::Full, dimension))
                } else if cutoffs[icoll] < cutoffs[jcoll] {
                    None
                } else if cutoffs[icoll] == cutoffs[jcoll] {
                    Some(Stencil::new(&grids[jcoll], cutoffs[icoll], shape, dimension))
                } else {
                    Some(Stencil::new(&grids[jcoll], cutoffs[icoll], StencilShape::Full, dimension))
                };
                stencils.push(stencil);
            }
        }

        return StencilTable { ncollections, stencils };
    }

    pub fn ncollections(&self) -> usize {
        self.ncollections
    }

    /// Get the stencil to scan collection `jcoll` bins from a collection
    /// `icoll` atom, if any
    pub fn get(&self, icoll: usize, jcoll: usize) -> Option<&Stencil> {
        self.stencils[icoll * self.ncollections + jcoll].as_ref()
    }
}
