use std::collections::BTreeSet;

use proxima::{AtomStore, Domain, UnitCell, Vector3D};
use proxima::{NeighborEngine, NeighborOptions, PairingMode};
use proxima::neighbors::CONTACT_HISTORY;

mod utils;
use utils::{assert_exactly_once, brute_force_pairs, random_positions, Lcg};

fn open_domain(lo: f64, hi: f64) -> Domain {
    Domain::new(
        UnitCell::infinite(),
        Vector3D::new(lo, lo, lo),
        Vector3D::new(hi, hi, hi),
        0.0,
    ).unwrap()
}

/// alternate between a small and a large atom type
fn mixed_types(n: usize) -> Vec<i32> {
    (0..n).map(|i| (i % 2) as i32).collect()
}

#[test]
fn per_type_cutoffs_single_collection() {
    let positions = random_positions(500, 0.0, 12.0, 0x5151);
    let types = mixed_types(positions.len());
    let atoms = AtomStore::new(
        positions.clone(),
        types.clone(),
        (0..positions.len() as i64).collect(),
        positions.len(),
    ).unwrap();
    let domain = open_domain(-0.5, 12.5);

    let mut options = NeighborOptions::new(2.0, 0.0, PairingMode::HalfNewtonOn);
    options.type_cutoffs = vec![1.0, 2.0];
    let mut engine = NeighborEngine::new(options).unwrap();
    let list = engine.build(&atoms, &domain).unwrap();

    // a pair of types uses the larger of the two cutoffs
    let expected = brute_force_pairs(&positions, |i, j| {
        if types[i] == 0 && types[j] == 0 { 1.0 } else { 2.0 }
    });
    assert_exactly_once(list, &expected);
}

#[test]
fn two_collections_match_brute_force() {
    let positions = random_positions(500, 0.0, 12.0, 0x2323);
    let types = mixed_types(positions.len());
    let atoms = AtomStore::new(
        positions.clone(),
        types.clone(),
        (0..positions.len() as i64).collect(),
        positions.len(),
    ).unwrap();
    let domain = open_domain(-0.5, 12.5);

    // same cutoffs as above, but with each type binned on its own grid: the
    // small collection defers all cross-collection pairs to the large one
    let mut options = NeighborOptions::new(2.0, 0.0, PairingMode::HalfNewtonOn);
    options.type_cutoffs = vec![1.0, 2.0];
    options.collections = vec![0, 1];
    let mut engine = NeighborEngine::new(options).unwrap();
    let list = engine.build(&atoms, &domain).unwrap();

    let expected = brute_force_pairs(&positions, |i, j| {
        if types[i] == 0 && types[j] == 0 { 1.0 } else { 2.0 }
    });
    assert_exactly_once(list, &expected);
}

#[test]
fn size_based_cutoffs() {
    let positions = random_positions(400, 0.0, 10.0, 0x6060);
    let mut lcg = Lcg::new(0x7070);
    let radii: Vec<f64> = (0..positions.len()).map(|_| 0.3 + 0.4 * lcg.next_f64()).collect();

    let atoms = AtomStore::new(
        positions.clone(),
        vec![0; positions.len()],
        (0..positions.len() as i64).collect(),
        positions.len(),
    ).unwrap().with_radii(radii.clone()).unwrap();
    let domain = open_domain(-0.5, 10.5);

    let mut options = NeighborOptions::new(1.0, 0.1, PairingMode::HalfNewtonOn);
    options.size_based = true;
    let mut engine = NeighborEngine::new(options).unwrap();
    let list = engine.build(&atoms, &domain).unwrap();

    // the cutoff of a pair is the sum of its radii plus the skin
    let expected = brute_force_pairs(&positions, |i, j| radii[i] + radii[j] + 0.1);
    assert_exactly_once(list, &expected);
}

#[test]
fn contact_history_flags_touching_pairs() {
    // three grains of radius 0.5: 0-1 overlap, 0-2 are in range of the
    // skin-extended cutoff but not touching
    let positions = vec![
        Vector3D::new(0.0, 0.0, 0.0),
        Vector3D::new(0.8, 0.0, 0.0),
        Vector3D::new(0.0, 1.1, 0.0),
    ];
    let atoms = AtomStore::new(positions, vec![0; 3], (0..3).collect(), 3)
        .unwrap()
        .with_radii(vec![0.5; 3])
        .unwrap();
    let domain = open_domain(-1.0, 2.0);

    let mut options = NeighborOptions::new(1.0, 0.2, PairingMode::HalfNewtonOn);
    options.size_based = true;
    options.contact_history = true;
    let mut engine = NeighborEngine::new(options).unwrap();
    let list = engine.build(&atoms, &domain).unwrap();

    let mut decoded: Vec<_> = list.decoded(0).collect();
    decoded.sort_unstable();
    assert_eq!(decoded, [(1, CONTACT_HISTORY), (2, 0)]);
}

#[test]
fn ghost_inclusive_lists() {
    let length = 6.0;
    let cutoff = 1.3;
    let locals = random_positions(150, 0.0, length, 0x8888);
    let nlocal = locals.len();

    let mut positions = locals.clone();
    let mut tags: Vec<i64> = (0..nlocal as i64).collect();
    let margin = cutoff + 0.1;
    for (owner, &position) in locals.iter().enumerate() {
        for dx in -1..=1_i32 {
            for dy in -1..=1_i32 {
                for dz in -1..=1_i32 {
                    if (dx, dy, dz) == (0, 0, 0) {
                        continue;
                    }
                    let image = position + Vector3D::new(
                        f64::from(dx) * length,
                        f64::from(dy) * length,
                        f64::from(dz) * length,
                    );
                    let inside = (0..3).all(|axis| {
                        image[axis] > -margin && image[axis] < length + margin
                    });
                    if inside {
                        positions.push(image);
                        tags.push(owner as i64);
                    }
                }
            }
        }
    }

    let n = positions.len();
    let atoms = AtomStore::new(positions.clone(), vec![0; n], tags, nlocal).unwrap();
    let domain = Domain::new(
        UnitCell::cubic(length),
        Vector3D::new(0.0, 0.0, 0.0),
        Vector3D::new(length, length, length),
        margin,
    ).unwrap();

    let mut options = NeighborOptions::new(cutoff, 0.0, PairingMode::HalfNewtonOff);
    options.include_ghosts = true;
    let mut engine = NeighborEngine::new(options).unwrap();
    let list = engine.build(&atoms, &domain).unwrap();

    assert_eq!(list.inum(), nlocal);
    assert_eq!(list.gnum(), n - nlocal);
    assert_eq!(list.ilist().len(), n);

    // with ghost reference atoms included, every in-range index pair is
    // attributed to its lower index, ghost pairs included
    let expected = brute_force_pairs(&positions, |_, _| cutoff);
    let mut emitted = BTreeSet::new();
    for &i in list.ilist() {
        for (j, _) in list.decoded(i) {
            assert!(j > i);
            assert!(emitted.insert((i, j)), "pair ({}, {}) emitted twice", i, j);
        }
    }
    assert_eq!(emitted, expected);
}
