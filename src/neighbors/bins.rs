use log::warn;

use crate::{AtomStore, Domain, Error, Vector3D};

/// A uniform grid of bins covering the local sub-domain extended by the ghost
/// halo. The grid is a pure function of the domain bounds and of one
/// interaction cutoff; in multi-cutoff mode each particle collection owns its
/// own grid.
#[derive(Debug, Clone, PartialEq)]
pub struct BinGrid {
    /// lower corner of the binned region
    lo: Vector3D,
    /// number of bins along each axis
    nbin: [usize; 3],
    /// edge length of one bin along each axis, at least cutoff/2
    binsize: Vector3D,
    /// cached `1 / binsize`
    bininv: Vector3D,
}

impl BinGrid {
    /// Compute the bin grid for the given domain and neighbor cutoff. The
    /// target bin edge is half the cutoff, adjusted upwards so that an
    /// integer number of bins covers each axis exactly.
    pub fn new(domain: &Domain, cutoff: f64) -> Result<BinGrid, Error> {
        if !(cutoff > 0.0) || !cutoff.is_finite() {
            return Err(Error::InvalidParameter(
                format!("neighbor cutoff must be positive and finite, got {}", cutoff)
            ));
        }

        let lo = domain.extended_lo();
        let hi = domain.extended_hi();
        let target = 0.5 * cutoff;

        let mut nbin = [1; 3];
        let mut binsize = Vector3D::zero();
        for axis in 0..3 {
            let extent = hi[axis] - lo[axis];
            if domain.dimension == 2 && axis == 2 {
                // single bin layer along z in 2D
                binsize[axis] = extent;
                continue;
            }

            let count = f64::floor(extent / target);
            nbin[axis] = if count < 1.0 { 1 } else { count as usize };
            binsize[axis] = extent / nbin[axis] as f64;
        }

        let total = (nbin[0] as i64)
            .checked_mul(nbin[1] as i64)
            .and_then(|total| total.checked_mul(nbin[2] as i64));
        if !matches!(total, Some(total) if total <= i64::from(i32::MAX)) {
            return Err(Error::Overflow(format!(
                "bin count {}x{}x{} overflows the bin index width; the domain \
                is too large for this cutoff", nbin[0], nbin[1], nbin[2]
            )));
        }

        // in 2D the z axis is a single layer by construction, only the
        // in-plane axes can degenerate
        if nbin[0] == 1 && nbin[1] == 1 && (nbin[2] == 1 || domain.dimension == 2) {
            warn!(
                "a single neighbor bin covers the whole domain (cutoff {} vs extent {:?}), \
                neighbor search degenerates to all-pairs", cutoff, hi - lo
            );
        }

        return Ok(BinGrid {
            lo: lo,
            nbin: nbin,
            binsize: binsize,
            bininv: Vector3D::new(1.0 / binsize[0], 1.0 / binsize[1], 1.0 / binsize[2]),
        });
    }

    /// Total number of bins in this grid
    pub fn n_bins(&self) -> usize {
        self.nbin[0] * self.nbin[1] * self.nbin[2]
    }

    /// Number of bins along each axis
    pub fn shape(&self) -> [usize; 3] {
        self.nbin
    }

    /// Per-axis bin coordinates of a position, without clamping. Values can
    /// be negative or past the grid for positions outside the binned region.
    pub fn bin_coordinates(&self, position: Vector3D) -> [i32; 3] {
        let mut coords = [0; 3];
        for axis in 0..3 {
            // floor-toward-origin: an atom exactly on a bin boundary belongs
            // to the bin whose lower edge it sits on
            coords[axis] = f64::floor((position[axis] - self.lo[axis]) * self.bininv[axis]) as i32;
        }
        return coords;
    }

    /// Check whether per-axis bin coordinates fall inside the grid
    pub fn contains(&self, coords: [i32; 3]) -> bool {
        (0..3).all(|axis| coords[axis] >= 0 && (coords[axis] as usize) < self.nbin[axis])
    }

    /// Flat bin index from per-axis coordinates, which must be inside the
    /// grid
    pub fn flat_index(&self, coords: [i32; 3]) -> usize {
        debug_assert!(self.contains(coords));
        (coords[2] as usize * self.nbin[1] + coords[1] as usize) * self.nbin[0]
            + coords[0] as usize
    }

    /// Per-axis bin coordinates of a position, clamped to the grid. This is
    /// the rule used to assign atoms to bins, so scanning from the same
    /// clamped coordinates always finds an atom's bin mates.
    pub fn clamped_coordinates(&self, position: Vector3D) -> [i32; 3] {
        let mut coords = self.bin_coordinates(position);
        for axis in 0..3 {
            coords[axis] = coords[axis].clamp(0, self.nbin[axis] as i32 - 1);
        }
        return coords;
    }

    /// Map any position to a bin index, clamping coordinates outside the
    /// binned region (ghost atoms near the halo boundary) to the closest
    /// boundary bin. Never out of range.
    pub fn coord_to_bin(&self, position: Vector3D) -> usize {
        self.flat_index(self.clamped_coordinates(position))
    }

    /// Number of bins to search along each axis so that all bins within
    /// `cutoff` of a reference bin are covered
    pub fn stencil_extent(&self, cutoff: f64, dimension: usize) -> [i32; 3] {
        let mut extent = [0; 3];
        for axis in 0..3 {
            if dimension == 2 && axis == 2 {
                continue;
            }
            extent[axis] = f64::ceil(cutoff * self.bininv[axis]) as i32;
        }
        return extent;
    }

    /// Squared minimal distance between a reference bin and the bin at the
    /// given offset: offset bins that share a face, edge or corner are at
    /// distance zero.
    pub fn bin_distance2(&self, offset: [i32; 3]) -> f64 {
        let mut distance2 = 0.0;
        for axis in 0..3 {
            let delta = match offset[axis] {
                d if d > 0 => (d - 1) as f64 * self.binsize[axis],
                d if d < 0 => (d + 1) as f64 * self.binsize[axis],
                _ => 0.0,
            };
            distance2 += delta * delta;
        }
        return distance2;
    }
}

/// The bin → atom mapping, rebuilt in full at every reneighbor step.
///
/// Chains are stored as arena-indexed adjacency: `head[bin]` is the first
/// atom in the bin, `next[atom]` the following one, `-1` terminates. Atoms
/// are inserted in decreasing index order so every chain lists its atoms in
/// increasing index order, locals before the ghosts mirroring them.
#[derive(Debug, Clone)]
pub struct BinnedAtoms {
    pub head: Vec<i32>,
    pub next: Vec<i32>,
    /// bin of each atom; -1 for atoms filtered out of this grid (other
    /// collections in multi-cutoff mode)
    pub bin_of: Vec<i32>,
}

impl BinnedAtoms {
    /// Assign all atoms to bins in O(N). When `collection` is given, only
    /// atoms of that collection are chained; others keep `bin_of == -1`.
    ///
    /// A *local* atom outside the extended (owned + ghost halo) region is a
    /// fatal error: it means the upstream ghost exchange is stale. Ghost
    /// atoms slightly outside the halo are clamped to boundary bins instead.
    pub fn build(
        grid: &BinGrid,
        atoms: &AtomStore,
        collection: Option<(&[usize], usize)>,
    ) -> Result<BinnedAtoms, Error> {
        let positions = atoms.positions();
        let nlocal = atoms.nlocal();

        let mut binned = BinnedAtoms {
            head: vec![-1; grid.n_bins()],
            next: vec![-1; positions.len()],
            bin_of: vec![-1; positions.len()],
        };

        // reversed so that chains end up in increasing atom index order
        for i in (0..positions.len()).rev() {
            if let Some((of_atom, which)) = collection {
                if of_atom[i] != which {
                    continue;
                }
            }

            let position = positions[i];
            if !position[0].is_finite() || !position[1].is_finite() || !position[2].is_finite() {
                return Err(Error::LostAtom(format!(
                    "atom {} has non-finite position {:?}", i, position
                )));
            }

            if i < nlocal && !grid.contains(grid.bin_coordinates(position)) {
                return Err(Error::LostAtom(format!(
                    "owned atom {} at {:?} is outside the local sub-domain plus ghost \
                    margin; the ghost exchange is stale or corrupted", i, position
                )));
            }

            let bin = grid.coord_to_bin(position);
            binned.bin_of[i] = bin as i32;
            binned.next[i] = binned.head[bin];
            binned.head[bin] = i as i32;
        }

        return Ok(binned);
    }

    /// Iterate over the atoms in the given bin, in increasing index order
    pub fn atoms_in_bin(&self, bin: usize) -> BinChain<'_> {
        BinChain {
            next: &self.next,
            current: self.head[bin],
        }
    }
}

/// Iterator following one bin chain
pub struct BinChain<'a> {
    next: &'a [i32],
    current: i32,
}

impl<'a> Iterator for BinChain<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.current < 0 {
            return None;
        }
        let atom = self.current as usize;
        self.current = self.next[atom];
        return Some(atom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnitCell;
    use approx::assert_ulps_eq;

    fn cubic_domain(length: f64, ghost: f64) -> Domain {
        Domain::new(
            UnitCell::cubic(length),
            Vector3D::zero(),
            Vector3D::new(length, length, length),
            ghost,
        ).unwrap()
    }

    #[test]
    fn grid_geometry() {
        let domain = cubic_domain(10.0, 0.0);
        let grid = BinGrid::new(&domain, 2.0).unwrap();

        // 10 / (2.0 / 2) = 10 bins per axis
        assert_eq!(grid.shape(), [10, 10, 10]);
        assert_eq!(grid.n_bins(), 1000);

        // bin edge is never below cutoff / 2
        let grid = BinGrid::new(&domain, 3.0).unwrap();
        assert_eq!(grid.shape(), [6, 6, 6]);
        assert_ulps_eq!(10.0 / 6.0, 1.6666666666666667);
    }

    #[test]
    fn grid_with_ghost_margin() {
        let domain = cubic_domain(10.0, 2.0);
        let grid = BinGrid::new(&domain, 2.0).unwrap();
        // extent is 14 with the halo on both sides
        assert_eq!(grid.shape(), [14, 14, 14]);
        assert_eq!(grid.coord_to_bin(Vector3D::new(-2.0, -2.0, -2.0)), 0);
    }

    #[test]
    fn two_dimensional_grid() {
        let domain = cubic_domain(10.0, 0.0).with_dimension(2).unwrap();
        let grid = BinGrid::new(&domain, 2.0).unwrap();
        assert_eq!(grid.shape(), [10, 10, 1]);
        assert_eq!(grid.stencil_extent(2.0, 2)[2], 0);
    }

    #[test]
    fn two_dimensional_degenerate_grid() {
        // a 2D grid collapsed to one in-plane bin still builds and assigns
        let domain = cubic_domain(1.0, 0.0).with_dimension(2).unwrap();
        let grid = BinGrid::new(&domain, 5.0).unwrap();
        assert_eq!(grid.shape(), [1, 1, 1]);
        assert_eq!(grid.coord_to_bin(Vector3D::new(0.5, 0.5, 0.0)), 0);
    }

    #[test]
    fn coord_to_bin_clamps() {
        let domain = cubic_domain(10.0, 0.0);
        let grid = BinGrid::new(&domain, 2.0).unwrap();

        // below the grid clamps to the first bin along that axis
        assert_eq!(grid.coord_to_bin(Vector3D::new(-15.0, 0.0, 0.0)), 0);
        assert_eq!(
            grid.coord_to_bin(Vector3D::new(-15.0, 0.5, 0.5)),
            grid.coord_to_bin(Vector3D::new(0.0, 0.5, 0.5)),
        );
        // above the grid clamps to the last bin
        let last = grid.n_bins() - 1;
        assert_eq!(grid.coord_to_bin(Vector3D::new(100.0, 100.0, 100.0)), last);
    }

    #[test]
    fn boundary_atoms_floor() {
        let domain = cubic_domain(10.0, 0.0);
        let grid = BinGrid::new(&domain, 2.0).unwrap();

        // an atom exactly on a bin boundary goes in the bin it is the lower
        // edge of
        assert_eq!(grid.bin_coordinates(Vector3D::new(1.0, 0.0, 0.0)), [1, 0, 0]);
        assert_eq!(grid.bin_coordinates(Vector3D::new(0.0, 0.0, 0.0)), [0, 0, 0]);
    }

    #[test]
    fn bin_distance() {
        let domain = cubic_domain(10.0, 0.0);
        let grid = BinGrid::new(&domain, 2.0).unwrap();

        assert_eq!(grid.bin_distance2([0, 0, 0]), 0.0);
        // adjacent bins touch
        assert_eq!(grid.bin_distance2([1, 0, 0]), 0.0);
        assert_eq!(grid.bin_distance2([-1, 1, 0]), 0.0);
        // one bin of separation
        assert_eq!(grid.bin_distance2([2, 0, 0]), 1.0);
        assert_eq!(grid.bin_distance2([2, 2, 0]), 2.0);
    }

    #[test]
    fn binning_chains() {
        let domain = cubic_domain(4.0, 0.0);
        let grid = BinGrid::new(&domain, 4.0).unwrap();
        assert_eq!(grid.shape(), [2, 2, 2]);

        let positions = vec![
            Vector3D::new(1.0, 1.0, 1.0),
            Vector3D::new(3.0, 1.0, 1.0),
            Vector3D::new(1.5, 1.5, 1.5),
            Vector3D::new(0.5, 0.5, 0.5),
        ];
        let atoms = AtomStore::new(positions, vec![0; 4], vec![1, 2, 3, 4], 4).unwrap();
        let binned = BinnedAtoms::build(&grid, &atoms, None).unwrap();

        // atoms 0, 2, 3 share the first bin, listed in increasing order
        let chain: Vec<usize> = binned.atoms_in_bin(0).collect();
        assert_eq!(chain, [0, 2, 3]);

        let chain: Vec<usize> = binned.atoms_in_bin(1).collect();
        assert_eq!(chain, [1]);

        assert_eq!(binned.bin_of[0], 0);
        assert_eq!(binned.bin_of[1], 1);
    }

    #[test]
    fn lost_local_atom() {
        let domain = cubic_domain(4.0, 0.0);
        let grid = BinGrid::new(&domain, 4.0).unwrap();

        let positions = vec![Vector3D::new(25.0, 0.0, 0.0)];
        let atoms = AtomStore::new(positions, vec![0], vec![1], 1).unwrap();
        let result = BinnedAtoms::build(&grid, &atoms, None);
        assert!(matches!(result, Err(Error::LostAtom(_))));

        // the same position as a ghost atom is clamped instead
        let positions = vec![Vector3D::new(1.0, 1.0, 1.0), Vector3D::new(25.0, 0.0, 0.0)];
        let atoms = AtomStore::new(positions, vec![0, 0], vec![1, 2], 1).unwrap();
        let binned = BinnedAtoms::build(&grid, &atoms, None).unwrap();
        assert_eq!(binned.bin_of[1], 1);
    }

    #[test]
    fn collection_filtering() {
        let domain = cubic_domain(4.0, 0.0);
        let grid = BinGrid::new(&domain, 4.0).unwrap();

        let positions = vec![
            Vector3D::new(0.5, 0.5, 0.5),
            Vector3D::new(1.0, 1.0, 1.0),
        ];
        let atoms = AtomStore::new(positions, vec![0, 1], vec![1, 2], 2).unwrap();

        let of_atom = vec![0, 1];
        let binned = BinnedAtoms::build(&grid, &atoms, Some((&of_atom, 1))).unwrap();
        assert_eq!(binned.bin_of[0], -1);
        assert_eq!(binned.bin_of[1], 0);
        let chain: Vec<usize> = binned.atoms_in_bin(0).collect();
        assert_eq!(chain, [1]);
    }

    #[test]
    fn bin_count_overflow() {
        let domain = cubic_domain(1.0e7, 0.0);
        let result = BinGrid::new(&domain, 2.0e-3);
        assert!(matches!(result, Err(Error::Overflow(_))));
    }
}
