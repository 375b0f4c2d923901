use crate::{Error, Vector3D};

mod cell;
pub use self::cell::{UnitCell, CellShape};

/// Per-atom bonded topology, listing for each owned atom the global tags of
/// its 1-2, 1-3 and 1-4 "special" neighbors.
///
/// For each atom the partners are stored in a single flat list (1-2 partners
/// first, then 1-3, then 1-4), with prefix counts giving the boundaries, the
/// same layout the bonded-topology subsystem communicates to the pair styles.
#[derive(Debug, Clone, Default)]
pub struct SpecialBonds {
    /// flat partner tags per atom: `[1-2..., 1-3..., 1-4...]`
    partners: Vec<Vec<i64>>,
    /// prefix counts per atom: `[n_12, n_12 + n_13, n_12 + n_13 + n_14]`
    counts: Vec<[usize; 3]>,
}

impl SpecialBonds {
    /// Create the special-bonds topology from per-atom partner lists. All
    /// three outer vectors must have one entry per owned atom.
    pub fn new(
        partners_12: Vec<Vec<i64>>,
        partners_13: Vec<Vec<i64>>,
        partners_14: Vec<Vec<i64>>,
    ) -> Result<SpecialBonds, Error> {
        if partners_12.len() != partners_13.len() || partners_12.len() != partners_14.len() {
            return Err(Error::InvalidParameter(
                "special bonds lists must all have one entry per owned atom".into()
            ));
        }

        let mut partners = Vec::with_capacity(partners_12.len());
        let mut counts = Vec::with_capacity(partners_12.len());
        for ((one_two, one_three), one_four) in partners_12.into_iter().zip(partners_13).zip(partners_14) {
            let n12 = one_two.len();
            let n13 = n12 + one_three.len();
            let n14 = n13 + one_four.len();

            let mut flat = one_two;
            flat.extend(one_three);
            flat.extend(one_four);

            partners.push(flat);
            counts.push([n12, n13, n14]);
        }

        return Ok(SpecialBonds { partners, counts });
    }

    /// Number of atoms covered by this topology
    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    /// Get the flat partner list and prefix counts for the given atom
    pub fn partners_of(&self, atom: usize) -> (&[i64], [usize; 3]) {
        (&self.partners[atom], self.counts[atom])
    }
}

/// The local sub-domain owned by this process: a region of the full
/// simulation cell, extended by the ghost cutoff margin on all sides.
///
/// For a single-process run the sub-domain bounds are simply the bounding box
/// of the cell (or of the atoms, for an infinite cell).
#[derive(Debug, Clone)]
pub struct Domain {
    /// full simulation cell, defining periodicity and the minimum image
    /// convention
    pub cell: UnitCell,
    /// lower corner of the owned region
    pub sub_lo: Vector3D,
    /// upper corner of the owned region
    pub sub_hi: Vector3D,
    /// width of the ghost halo around the owned region
    pub ghost_cutoff: f64,
    /// 2 or 3; in 2D the z axis has a single bin layer
    pub dimension: usize,
}

impl Domain {
    pub fn new(
        cell: UnitCell,
        sub_lo: Vector3D,
        sub_hi: Vector3D,
        ghost_cutoff: f64,
    ) -> Result<Domain, Error> {
        if !(ghost_cutoff >= 0.0) || !ghost_cutoff.is_finite() {
            return Err(Error::InvalidParameter(
                format!("ghost cutoff must be finite and non-negative, got {}", ghost_cutoff)
            ));
        }

        for axis in 0..3 {
            if !(sub_lo[axis] < sub_hi[axis]) {
                return Err(Error::InvalidParameter(format!(
                    "sub-domain is empty along axis {}: [{}, {}]",
                    axis, sub_lo[axis], sub_hi[axis]
                )));
            }
        }

        return Ok(Domain {
            cell: cell,
            sub_lo: sub_lo,
            sub_hi: sub_hi,
            ghost_cutoff: ghost_cutoff,
            dimension: 3,
        });
    }

    /// Make this a 2D domain: positions must have `z == 0` and bins form a
    /// single layer along z.
    pub fn with_dimension(mut self, dimension: usize) -> Result<Domain, Error> {
        if dimension != 2 && dimension != 3 {
            return Err(Error::InvalidParameter(
                format!("dimension must be 2 or 3, got {}", dimension)
            ));
        }
        self.dimension = dimension;
        return Ok(self);
    }

    /// Lower corner of the owned region extended by the ghost halo
    pub fn extended_lo(&self) -> Vector3D {
        self.sub_lo - Vector3D::new(self.ghost_cutoff, self.ghost_cutoff, self.ghost_cutoff)
    }

    /// Upper corner of the owned region extended by the ghost halo
    pub fn extended_hi(&self) -> Vector3D {
        self.sub_hi + Vector3D::new(self.ghost_cutoff, self.ghost_cutoff, self.ghost_cutoff)
    }
}

/// Storage for all atoms this process knows about: owned atoms first, then
/// read-only ghost mirrors of atoms owned by neighboring processes.
///
/// Ghost atoms are created and destroyed by the (external) communication
/// layer before every reneighbor step; this crate only reads them.
#[derive(Debug, Clone)]
pub struct AtomStore {
    positions: Vec<Vector3D>,
    /// species id per atom, 0-based
    types: Vec<i32>,
    /// globally unique atom tags; ghosts carry the tag of their owner
    tags: Vec<i64>,
    /// number of owned atoms; indices `>= nlocal` are ghosts
    nlocal: usize,
    /// per-atom radius, for size-based (granular) lists
    radii: Option<Vec<f64>>,
    /// group membership bitmask per atom
    group_mask: Vec<u32>,
    /// molecule id per atom, -1 when the atom belongs to no molecule
    molecule: Vec<i64>,
    /// bonded topology of owned atoms
    special: Option<SpecialBonds>,
}

impl AtomStore {
    /// Create a new store with `nlocal` owned atoms; any extra entries in the
    /// input arrays are ghost atoms.
    pub fn new(
        positions: Vec<Vector3D>,
        types: Vec<i32>,
        tags: Vec<i64>,
        nlocal: usize,
    ) -> Result<AtomStore, Error> {
        let n = positions.len();
        if types.len() != n || tags.len() != n {
            return Err(Error::InvalidParameter(format!(
                "inconsistent atom arrays: {} positions, {} types, {} tags",
                n, types.len(), tags.len()
            )));
        }
        if nlocal > n {
            return Err(Error::InvalidParameter(format!(
                "nlocal ({}) larger than the number of atoms ({})", nlocal, n
            )));
        }
        if types.iter().any(|&t| t < 0) {
            return Err(Error::InvalidParameter("atom types must be non-negative".into()));
        }

        return Ok(AtomStore {
            positions: positions,
            types: types,
            tags: tags,
            nlocal: nlocal,
            radii: None,
            group_mask: vec![1; n],
            molecule: vec![-1; n],
            special: None,
        });
    }

    /// Add per-atom radii, enabling size-based neighbor lists
    pub fn with_radii(mut self, radii: Vec<f64>) -> Result<AtomStore, Error> {
        if radii.len() != self.positions.len() {
            return Err(Error::InvalidParameter(format!(
                "expected {} radii, got {}", self.positions.len(), radii.len()
            )));
        }
        if radii.iter().any(|&r| !(r >= 0.0) || !r.is_finite()) {
            return Err(Error::InvalidParameter("atom radii must be finite and non-negative".into()));
        }
        self.radii = Some(radii);
        return Ok(self);
    }

    /// Set the group membership bitmasks used by group exclusion rules
    pub fn with_group_mask(mut self, mask: Vec<u32>) -> Result<AtomStore, Error> {
        if mask.len() != self.positions.len() {
            return Err(Error::InvalidParameter(format!(
                "expected {} group masks, got {}", self.positions.len(), mask.len()
            )));
        }
        self.group_mask = mask;
        return Ok(self);
    }

    /// Set the molecule ids used by molecular exclusion rules, -1 meaning
    /// "not part of a molecule"
    pub fn with_molecules(mut self, molecule: Vec<i64>) -> Result<AtomStore, Error> {
        if molecule.len() != self.positions.len() {
            return Err(Error::InvalidParameter(format!(
                "expected {} molecule ids, got {}", self.positions.len(), molecule.len()
            )));
        }
        self.molecule = molecule;
        return Ok(self);
    }

    /// Set the bonded special-bonds topology for the owned atoms
    pub fn with_special(mut self, special: SpecialBonds) -> Result<AtomStore, Error> {
        if special.len() != self.nlocal {
            return Err(Error::InvalidParameter(format!(
                "special bonds topology covers {} atoms, expected nlocal = {}",
                special.len(), self.nlocal
            )));
        }
        self.special = Some(special);
        return Ok(self);
    }

    /// Total number of atoms, owned + ghosts
    pub fn total(&self) -> usize {
        self.positions.len()
    }

    /// Number of owned atoms
    pub fn nlocal(&self) -> usize {
        self.nlocal
    }

    /// Number of ghost atoms
    pub fn nghost(&self) -> usize {
        self.positions.len() - self.nlocal
    }

    /// Number of distinct atom types (largest type id + 1)
    pub fn ntypes(&self) -> usize {
        self.types.iter().map(|&t| t as usize + 1).max().unwrap_or(0)
    }

    pub fn positions(&self) -> &[Vector3D] {
        &self.positions
    }

    pub fn types(&self) -> &[i32] {
        &self.types
    }

    pub fn tags(&self) -> &[i64] {
        &self.tags
    }

    pub fn radii(&self) -> Option<&[f64]> {
        self.radii.as_deref()
    }

    pub fn group_mask(&self) -> &[u32] {
        &self.group_mask
    }

    pub fn molecule(&self) -> &[i64] {
        &self.molecule
    }

    pub fn special(&self) -> Option<&SpecialBonds> {
        self.special.as_ref()
    }
}
