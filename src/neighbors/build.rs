use std::ops::Range;

use log::warn;
use ndarray::Array2;
use rayon::prelude::*;

use crate::{AtomStore, Domain, Error};
use super::PairingMode;
use super::arena::{self, ChunkHandle, PageArena, CONTACT_HISTORY, MAX_ATOM_INDEX};
use super::bins::{BinGrid, BinnedAtoms};
use super::list::NeighborList;
use super::special::{find_special, ExclusionRules, SpecialCheck, SpecialSettings};
use super::stencil::StencilTable;

/// Below this many reference atoms a parallel build is not worth the
/// per-range arenas, and the sequential path is used instead
const PARALLEL_THRESHOLD: usize = 4096;

/// Number of reference atoms per parallel build range
const RANGE_SIZE: usize = 1024;

/// The tagged variant parameters selecting one member of the build family.
/// Every combination is a distinct algorithm instance in the original
/// engine; here they compose orthogonally.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuildPlan {
    pub pairing: PairingMode,
    /// triclinic cells apply the coordinate tie-break across the whole half
    /// stencil, orthogonal cells only inside the reference bin
    pub triclinic: bool,
    /// size-based (granular) cutoffs from per-atom radii instead of the
    /// per-type-pair table
    pub size_based: bool,
    /// flag size-based pairs already in contact, for history-tracking force
    /// models
    pub contact_history: bool,
    /// also build lists for ghost reference atoms
    pub include_ghosts: bool,
}

/// Everything a build pass reads. Grids, stencils and bins are immutable
/// for the whole pass; per-range state lives in the range's own arena.
pub(crate) struct BuildContext<'a> {
    pub atoms: &'a AtomStore,
    pub domain: &'a Domain,
    pub plan: BuildPlan,
    /// squared neighbor cutoff (interaction cutoff + skin) per type pair;
    /// not used in size-based mode
    pub cutneighsq: &'a Array2<f64>,
    pub skin: f64,
    pub grids: &'a [BinGrid],
    pub binned: &'a [BinnedAtoms],
    pub stencils: &'a StencilTable,
    /// collection of every atom; all zeros with a single collection
    pub collection: &'a [usize],
    /// neighbor cutoff per collection
    pub collection_cutoff: &'a [f64],
    pub exclusions: Option<&'a ExclusionRules>,
    pub special: SpecialSettings,
}

/// Build the neighbor lists for one contiguous range of reference atoms,
/// writing entries into the given arena. Returns one chunk handle per atom
/// in the range.
fn build_range(
    ctx: &BuildContext<'_>,
    range: Range<usize>,
    arena: &mut PageArena,
) -> Result<Vec<ChunkHandle>, Error> {
    let positions = ctx.atoms.positions();
    let types = ctx.atoms.types();
    let tags = ctx.atoms.tags();
    let masks = ctx.atoms.group_mask();
    let molecules = ctx.atoms.molecule();
    let radii = ctx.atoms.radii();
    let topology = ctx.atoms.special();
    let nlocal = ctx.atoms.nlocal();

    let mut handles = Vec::with_capacity(range.len());

    for i in range {
        arena.begin();

        let xi = positions[i];
        let itype = types[i] as usize;
        let icollection = ctx.collection[i];
        let radius_i = radii.map_or(0.0, |radii| radii[i]);
        let i_is_ghost = i >= nlocal;

        for jcollection in 0..ctx.stencils.ncollections() {
            let Some(stencil) = ctx.stencils.get(icollection, jcollection) else {
                // this collection's cutoff is smaller: the other side of the
                // pair owns the search
                continue;
            };

            let grid = &ctx.grids[jcollection];
            let binned = &ctx.binned[jcollection];
            let reference = grid.clamped_coordinates(xi);

            // equal cutoffs mean a half stencil, resolved by the per-atom
            // coordinate tie-break; a larger cutoff on our side means a full
            // stencil and no tie-break at all
            let half_same = ctx.plan.pairing == PairingMode::HalfNewtonOn
                && ctx.collection_cutoff[icollection] == ctx.collection_cutoff[jcollection];

            for &offset in stencil.offsets() {
                let target = [
                    reference[0] + offset[0],
                    reference[1] + offset[1],
                    reference[2] + offset[2],
                ];
                if !grid.contains(target) {
                    continue;
                }

                let in_reference_bin = offset == [0, 0, 0];
                let tie_break = half_same && (ctx.plan.triclinic || in_reference_bin);

                for j in binned.atoms_in_bin(grid.flat_index(target)) {
                    match ctx.plan.pairing {
                        PairingMode::HalfNewtonOn => {
                            if tie_break {
                                // skip candidates "behind" the reference
                                // atom: lower z, or same z and lower y, or
                                // same z-y and lower x, with index order for
                                // fully superposed atoms (this also drops
                                // the self pair)
                                let xj = positions[j];
                                if xj[2] < xi[2] {
                                    continue;
                                }
                                if xj[2] == xi[2] {
                                    if xj[1] < xi[1] {
                                        continue;
                                    }
                                    if xj[1] == xi[1] {
                                        if xj[0] < xi[0] {
                                            continue;
                                        }
                                        if xj[0] == xi[0] && j <= i {
                                            continue;
                                        }
                                    }
                                }
                            }
                        }
                        PairingMode::HalfNewtonOff => {
                            // each unordered pair is kept by its lower index
                            if j <= i {
                                continue;
                            }
                        }
                        PairingMode::Full => {
                            if j == i {
                                continue;
                            }
                        }
                    }

                    let jtype = types[j] as usize;
                    if let Some(rules) = ctx.exclusions {
                        if rules.excluded(
                            itype as i32, jtype as i32,
                            masks[i], masks[j],
                            molecules[i], molecules[j],
                        ) {
                            continue;
                        }
                    }

                    let delta = xi - positions[j];
                    let rsq = delta.norm2();

                    if ctx.plan.size_based {
                        let radius_sum = radius_i + radii.map_or(0.0, |radii| radii[j]);
                        let cutoff = radius_sum + ctx.skin;
                        if rsq <= cutoff * cutoff {
                            if ctx.plan.contact_history && rsq < radius_sum * radius_sum {
                                arena.push(arena::pack(j, CONTACT_HISTORY));
                            } else {
                                arena.push(j as u32);
                            }
                        }
                        continue;
                    }

                    if rsq <= ctx.cutneighsq[(itype, jtype)] {
                        if rsq < 1e-6 {
                            warn!(
                                "atoms {} and {} are very close to one another ({} A)",
                                i, j, rsq.sqrt()
                            );
                        }

                        // ghost reference atoms carry no bonded topology
                        let topology = match topology {
                            Some(topology) if !i_is_ghost => topology,
                            _ => {
                                arena.push(j as u32);
                                continue;
                            }
                        };

                        match find_special(topology, ctx.special, i, tags[j]) {
                            SpecialCheck::NotSpecial => arena.push(j as u32),
                            which => {
                                if ctx.domain.cell.minimum_image_check(delta) {
                                    // the bonded partner with this tag is a
                                    // different periodic image: treat this
                                    // pair as a plain one
                                    arena.push(j as u32);
                                } else if let SpecialCheck::Scaled(class) = which {
                                    arena.push(arena::pack(j, class));
                                }
                                // SpecialCheck::Excluded: drop the pair
                            }
                        }
                    }
                }
            }
        }

        handles.push(arena.commit()?);
    }

    return Ok(handles);
}

/// Build the complete neighbor list for all reference atoms.
///
/// The per-atom loop is embarrassingly parallel: for large systems it is
/// split in disjoint ranges processed by rayon, each writing into a private
/// arena, followed by a cheap sequential merge of the per-atom handles. The
/// build either completes as a whole or fails with the first error; there is
/// no partially-valid output.
#[time_graph::instrument(name = "NeighborList::build")]
pub(crate) fn build(
    ctx: &BuildContext<'_>,
    page_size: usize,
    max_chunk: usize,
    parallel: bool,
) -> Result<NeighborList, Error> {
    let nlocal = ctx.atoms.nlocal();
    let nall = ctx.atoms.total();
    let nrefs = if ctx.plan.include_ghosts { nall } else { nlocal };

    if nall > MAX_ATOM_INDEX + 1 {
        return Err(Error::Overflow(format!(
            "{} local + ghost atoms do not fit the {}-bit packed neighbor index",
            nall, arena::SBBITS
        )));
    }

    let mut handles = vec![(0_u32, ChunkHandle::default()); nall];
    let mut arenas = Vec::new();

    if parallel && nrefs >= PARALLEL_THRESHOLD {
        let ranges = split_ranges(nrefs, RANGE_SIZE);
        let results = ranges
            .into_par_iter()
            .map(|range| {
                let mut arena = PageArena::new(page_size, max_chunk)?;
                let handles = build_range(ctx, range.clone(), &mut arena)?;
                Ok((range, arena, handles))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        for (range, arena, range_handles) in results {
            let arena_index = arenas.len() as u32;
            for (i, handle) in range.zip(range_handles) {
                handles[i] = (arena_index, handle);
            }
            arenas.push(arena);
        }
    } else {
        let mut arena = PageArena::new(page_size, max_chunk)?;
        let range_handles = build_range(ctx, 0..nrefs, &mut arena)?;
        for (i, handle) in (0..nrefs).zip(range_handles) {
            handles[i] = (0, handle);
        }
        arenas.push(arena);
    }

    return Ok(NeighborList {
        arenas: arenas,
        handles: handles,
        ilist: (0..nrefs).collect(),
        inum: usize::min(nlocal, nrefs),
        gnum: nrefs.saturating_sub(nlocal),
    });
}

fn split_ranges(total: usize, size: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(total / size + 1);
    let mut start = 0;
    while start < total {
        let end = usize::min(start + size, total);
        ranges.push(start..end);
        start = end;
    }
    return ranges;
}
