use log::warn;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{AtomStore, Domain, Error, Vector3D};

mod arena;
pub use self::arena::{pack, unpack_class, unpack_index};
pub use self::arena::{PageArena, CONTACT_HISTORY, INDEX_MASK, MAX_ATOM_INDEX, SBBITS};

mod bins;
pub use self::bins::{BinGrid, BinnedAtoms};

mod stencil;
pub use self::stencil::{Stencil, StencilShape, StencilTable};

mod special;
pub use self::special::{find_special, SpecialCheck, SpecialPolicy, SpecialSettings};
pub use self::special::{ExclusionRules, MoleculePolicy};

mod list;
pub use self::list::NeighborList;

mod build;
use self::build::{BuildContext, BuildPlan};

/// How pairs are attributed to reference atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingMode {
    /// Every in-range ordered pair appears in both atoms' lists
    Full,
    /// Each unordered pair appears exactly once network-wide, attributed by
    /// the forward bin order and the per-atom coordinate tie-break
    HalfNewtonOn,
    /// Each unordered pair appears once per process, attributed to the lower
    /// atom index; pairs with ghosts are duplicated across processes
    HalfNewtonOff,
}

fn default_page_size() -> usize { 100_000 }
fn default_max_neighbors() -> usize { 2000 }
fn default_parallel() -> bool { true }

/// Configuration for a [`NeighborEngine`].
///
/// All cutoffs are interaction cutoffs; the engine adds `skin` on top when
/// binning and testing distances, so lists stay valid until an atom moves by
/// more than half the skin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighborOptions {
    /// global interaction cutoff, used for every type pair unless
    /// `type_cutoffs` is set
    pub cutoff: f64,
    /// extra margin added to every cutoff
    pub skin: f64,
    pub pairing: PairingMode,
    /// per-type interaction cutoffs; a pair of types uses the larger of the
    /// two. Empty means "use `cutoff` everywhere".
    #[serde(default)]
    pub type_cutoffs: Vec<f64>,
    /// particle collection of each type, for multi-cutoff (mixed size)
    /// simulations. Empty means a single collection.
    #[serde(default)]
    pub collections: Vec<usize>,
    /// also build lists for ghost reference atoms (Newton off or full lists
    /// only)
    #[serde(default)]
    pub include_ghosts: bool,
    /// size-based (granular) mode: the cutoff of a pair is the sum of the
    /// two atom radii plus the skin
    #[serde(default)]
    pub size_based: bool,
    /// in size-based mode, flag pairs already in contact for
    /// history-tracking force models
    #[serde(default)]
    pub contact_history: bool,
    /// what to do with 1-2/1-3/1-4 bonded pairs
    #[serde(default)]
    pub special: SpecialSettings,
    /// entries per arena page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// largest allowed per-atom neighbor count; exceeding it is a fatal
    /// error, not a truncation
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    /// split the build over rayon threads for large systems
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl NeighborOptions {
    /// Options with the given cutoff and skin, a single collection, and all
    /// other settings at their defaults
    pub fn new(cutoff: f64, skin: f64, pairing: PairingMode) -> NeighborOptions {
        NeighborOptions {
            cutoff: cutoff,
            skin: skin,
            pairing: pairing,
            type_cutoffs: Vec::new(),
            collections: Vec::new(),
            include_ghosts: false,
            size_based: false,
            contact_history: false,
            special: SpecialSettings::default(),
            page_size: default_page_size(),
            max_neighbors: default_max_neighbors(),
            parallel: default_parallel(),
        }
    }
}

/// Bin grids, stencils and cutoff tables: everything which only depends on
/// the domain geometry and the cutoffs, not on atom positions. Recomputed
/// when the box shape changes, not at every reneighbor step.
struct Geometry {
    grids: Vec<BinGrid>,
    stencils: StencilTable,
    collection_of_type: Vec<usize>,
    collection_cutoff: Vec<f64>,
    /// squared (cutoff + skin) per type pair
    cutneighsq: Array2<f64>,
    signature: Signature,
}

/// Inputs which invalidate the cached geometry when they change
#[derive(Clone, PartialEq)]
struct Signature {
    cell: crate::Matrix3,
    sub_lo: Vector3D,
    sub_hi: Vector3D,
    ghost_cutoff: f64,
    dimension: usize,
    ntypes: usize,
    /// largest atom radius, driving grid sizes in size-based mode
    max_radius: f64,
}

/// The neighbor-list engine: owns the cached geometry, the bins and the
/// current lists, and rebuilds them on demand.
///
/// A typical integration loop calls [`NeighborEngine::build`] whenever its
/// reneighboring policy decides the lists are stale, using
/// [`NeighborEngine::steps_since_build`] and
/// [`NeighborEngine::max_displacement2`] as the inputs of that decision, and
/// [`NeighborEngine::advance_step`] every timestep.
pub struct NeighborEngine {
    options: NeighborOptions,
    exclusions: Option<ExclusionRules>,
    geometry: Option<Geometry>,
    list: Option<NeighborList>,
    /// owned atom positions at the time of the last build
    hold_positions: Vec<Vector3D>,
    steps_since_build: u64,
}

impl NeighborEngine {
    pub fn new(options: NeighborOptions) -> Result<NeighborEngine, Error> {
        if !(options.cutoff > 0.0) || !options.cutoff.is_finite() {
            return Err(Error::InvalidParameter(
                format!("cutoff must be positive and finite, got {}", options.cutoff)
            ));
        }
        if !(options.skin >= 0.0) || !options.skin.is_finite() {
            return Err(Error::InvalidParameter(
                format!("skin must be non-negative and finite, got {}", options.skin)
            ));
        }
        if options.type_cutoffs.iter().any(|&cutoff| !(cutoff > 0.0) || !cutoff.is_finite()) {
            return Err(Error::InvalidParameter(
                "all type cutoffs must be positive and finite".into()
            ));
        }
        if options.include_ghosts && options.pairing == PairingMode::HalfNewtonOn {
            return Err(Error::InvalidParameter(
                "ghost-inclusive lists require full or Newton-off pairing".into()
            ));
        }
        if options.contact_history && !options.size_based {
            return Err(Error::InvalidParameter(
                "contact history only applies to size-based lists".into()
            ));
        }
        if options.max_neighbors == 0 || options.page_size < options.max_neighbors {
            return Err(Error::InvalidParameter(format!(
                "page size ({}) must be at least max_neighbors ({})",
                options.page_size, options.max_neighbors
            )));
        }

        return Ok(NeighborEngine {
            options: options,
            exclusions: None,
            geometry: None,
            list: None,
            hold_positions: Vec::new(),
            steps_since_build: 0,
        });
    }

    /// Create an engine from JSON options, in the same format `serde_json`
    /// serializes [`NeighborOptions`] to
    pub fn from_json(json: &str) -> Result<NeighborEngine, Error> {
        let options: NeighborOptions = serde_json::from_str(json)?;
        return NeighborEngine::new(options);
    }

    pub fn options(&self) -> &NeighborOptions {
        &self.options
    }

    /// Set the group/type/molecule exclusion rules applied before
    /// special-bonds resolution
    pub fn set_exclusions(&mut self, rules: ExclusionRules) {
        self.exclusions = if rules.is_empty() { None } else { Some(rules) };
    }

    /// The current lists, if any build completed
    pub fn list(&self) -> Option<&NeighborList> {
        self.list.as_ref()
    }

    /// Record one elapsed timestep since the last build
    pub fn advance_step(&mut self) {
        self.steps_since_build += 1;
    }

    /// Number of timesteps elapsed since the last build; an input of the
    /// external reneighboring policy
    pub fn steps_since_build(&self) -> u64 {
        self.steps_since_build
    }

    /// Largest squared displacement of any owned atom since the last build;
    /// an input of the external reneighboring policy (lists are usually
    /// considered stale when this exceeds half the squared skin)
    pub fn max_displacement2(&self, positions: &[Vector3D]) -> f64 {
        let mut max = 0.0_f64;
        for (current, hold) in positions.iter().zip(&self.hold_positions) {
            max = f64::max(max, (*current - *hold).norm2());
        }
        return max;
    }

    /// Rebuild bins and neighbor lists from the current atom positions.
    ///
    /// Ghost atoms must be up to date in `atoms` before calling this; the
    /// engine tears down and recreates all bins and lists, there is no
    /// incremental update. Returns the freshly built list.
    pub fn build(&mut self, atoms: &AtomStore, domain: &Domain) -> Result<&NeighborList, Error> {
        self.validate_atoms(atoms)?;
        self.ensure_geometry(atoms, domain)?;
        let Some(geometry) = &self.geometry else {
            unreachable!("the geometry is computed right above")
        };

        let collection: Vec<usize> = atoms.types()
            .iter()
            .map(|&t| geometry.collection_of_type[t as usize])
            .collect();

        let mut binned = Vec::with_capacity(geometry.grids.len());
        for (which, grid) in geometry.grids.iter().enumerate() {
            let filter = if geometry.grids.len() > 1 {
                Some((collection.as_slice(), which))
            } else {
                None
            };
            binned.push(BinnedAtoms::build(grid, atoms, filter)?);
        }

        let plan = BuildPlan {
            pairing: self.options.pairing,
            triclinic: domain.cell.is_triclinic(),
            size_based: self.options.size_based,
            contact_history: self.options.contact_history,
            include_ghosts: self.options.include_ghosts,
        };

        let context = BuildContext {
            atoms: atoms,
            domain: domain,
            plan: plan,
            cutneighsq: &geometry.cutneighsq,
            skin: self.options.skin,
            grids: &geometry.grids,
            binned: &binned,
            stencils: &geometry.stencils,
            collection: &collection,
            collection_cutoff: &geometry.collection_cutoff,
            exclusions: self.exclusions.as_ref(),
            special: self.options.special,
        };

        let list = build::build(
            &context,
            self.options.page_size,
            self.options.max_neighbors,
            self.options.parallel,
        )?;

        self.hold_positions.clear();
        self.hold_positions.extend_from_slice(&atoms.positions()[..atoms.nlocal()]);
        self.steps_since_build = 0;
        return Ok(self.list.insert(list));
    }

    fn validate_atoms(&self, atoms: &AtomStore) -> Result<(), Error> {
        if self.options.size_based && atoms.radii().is_none() {
            return Err(Error::InvalidParameter(
                "size-based neighbor lists require per-atom radii".into()
            ));
        }

        let ntypes = atoms.ntypes();
        if !self.options.type_cutoffs.is_empty() && self.options.type_cutoffs.len() < ntypes {
            return Err(Error::InvalidParameter(format!(
                "{} type cutoffs given, but atoms use {} types",
                self.options.type_cutoffs.len(), ntypes
            )));
        }
        if !self.options.collections.is_empty() && self.options.collections.len() < ntypes {
            return Err(Error::InvalidParameter(format!(
                "{} collection assignments given, but atoms use {} types",
                self.options.collections.len(), ntypes
            )));
        }

        return Ok(());
    }

    /// Recompute grids, stencils and cutoff tables if the domain geometry
    /// changed since the last build (or this is the first one)
    fn ensure_geometry(&mut self, atoms: &AtomStore, domain: &Domain) -> Result<(), Error> {
        let ntypes = usize::max(atoms.ntypes(), 1);
        let max_radius = atoms.radii()
            .map_or(0.0, |radii| radii.iter().copied().fold(0.0, f64::max));

        let signature = Signature {
            cell: domain.cell.matrix(),
            sub_lo: domain.sub_lo,
            sub_hi: domain.sub_hi,
            ghost_cutoff: domain.ghost_cutoff,
            dimension: domain.dimension,
            ntypes: ntypes,
            max_radius: max_radius,
        };

        if let Some(geometry) = &self.geometry {
            if geometry.signature == signature {
                return Ok(());
            }
        }

        // interaction cutoff per type
        let type_cutoff = |t: usize| -> f64 {
            if self.options.type_cutoffs.is_empty() {
                self.options.cutoff
            } else {
                self.options.type_cutoffs[t]
            }
        };

        let mut cutneighsq = Array2::zeros((ntypes, ntypes));
        for i in 0..ntypes {
            for j in 0..ntypes {
                let cutoff = f64::max(type_cutoff(i), type_cutoff(j)) + self.options.skin;
                cutneighsq[(i, j)] = cutoff * cutoff;
            }
        }

        let collection_of_type = if self.options.collections.is_empty() {
            vec![0; ntypes]
        } else {
            self.options.collections[..ntypes].to_vec()
        };
        let ncollections = collection_of_type.iter().map(|&c| c + 1).max().unwrap_or(1);

        // neighbor cutoff (interaction + skin) of each collection, driving
        // both the grid resolution and the stencil extents
        let mut collection_cutoff = vec![0.0_f64; ncollections];
        if self.options.size_based {
            let mut max_radius = vec![0.0_f64; ncollections];
            if let Some(radii) = atoms.radii() {
                for (i, &t) in atoms.types().iter().enumerate() {
                    let collection = collection_of_type[t as usize];
                    max_radius[collection] = f64::max(max_radius[collection], radii[i]);
                }
            }
            for c in 0..ncollections {
                collection_cutoff[c] = 2.0 * max_radius[c] + self.options.skin;
            }
        } else {
            for t in 0..ntypes {
                let collection = collection_of_type[t];
                let cutoff = type_cutoff(t) + self.options.skin;
                collection_cutoff[collection] = f64::max(collection_cutoff[collection], cutoff);
            }
        }

        for (c, &cutoff) in collection_cutoff.iter().enumerate() {
            if !(cutoff > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "collection {} has no positive neighbor cutoff (empty collection?)", c
                )));
            }
        }

        let max_cutoff = collection_cutoff.iter().copied().fold(0.0, f64::max);
        if !domain.cell.is_infinite() {
            if domain.ghost_cutoff > 0.0 && domain.ghost_cutoff < max_cutoff {
                warn!(
                    "ghost margin ({}) is smaller than the largest neighbor cutoff ({}); \
                    pairs crossing the sub-domain boundary can be missed",
                    domain.ghost_cutoff, max_cutoff
                );
            }

            let faces = domain.cell.distances_between_faces();
            let min_face = f64::min(faces[0], f64::min(faces[1], faces[2]));
            if 2.0 * max_cutoff > min_face {
                warn!(
                    "the largest neighbor cutoff ({}) exceeds half the distance between \
                    cell faces ({}); atoms can interact with more than one periodic image \
                    of the same partner",
                    max_cutoff, min_face
                );
            }
        }

        let mut grids = Vec::with_capacity(ncollections);
        for &cutoff in &collection_cutoff {
            grids.push(BinGrid::new(domain, cutoff)?);
        }

        let shape = match self.options.pairing {
            PairingMode::HalfNewtonOn if domain.cell.is_triclinic() => StencilShape::HalfSkewed,
            PairingMode::HalfNewtonOn => StencilShape::Half,
            PairingMode::HalfNewtonOff | PairingMode::Full => StencilShape::Full,
        };
        let stencils = if ncollections == 1 {
            StencilTable::single(&grids[0], collection_cutoff[0], shape, domain.dimension)
        } else {
            StencilTable::multi(&grids, &collection_cutoff, shape, domain.dimension)
        };

        self.geometry = Some(Geometry {
            grids: grids,
            stencils: stencils,
            collection_of_type: collection_of_type,
            collection_cutoff: collection_cutoff,
            cutneighsq: cutneighsq,
            signature: signature,
        });
        // geometry changed: the current list no longer matches it
        self.list = None;
        return Ok(());
    }
}
