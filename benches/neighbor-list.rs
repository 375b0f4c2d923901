#![allow(clippy::needless_return)]

use proxima::{AtomStore, Domain, UnitCell, Vector3D};
use proxima::{NeighborEngine, NeighborOptions, PairingMode};

use criterion::{BenchmarkGroup, Criterion, measurement::WallTime, SamplingMode};
use criterion::{black_box, criterion_group, criterion_main};

/// Deterministic pseudo-random atoms filling a cubic box at roughly
/// liquid-argon density
fn bulk_system(n_atoms: usize) -> (AtomStore, Domain) {
    let density = 0.025;
    let length = (n_atoms as f64 / density).cbrt();

    let mut state = 0x2545f4914f6cdd1d_u64;
    let mut uniform = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64 * length
    };

    let positions: Vec<_> = (0..n_atoms)
        .map(|_| Vector3D::new(uniform(), uniform(), uniform()))
        .collect();
    let atoms = AtomStore::new(
        positions,
        vec![0; n_atoms],
        (0..n_atoms as i64).collect(),
        n_atoms,
    ).expect("failed to build atoms");

    let domain = Domain::new(
        UnitCell::cubic(length),
        Vector3D::new(-0.1, -0.1, -0.1),
        Vector3D::new(length + 0.1, length + 0.1, length + 0.1),
        0.0,
    ).expect("failed to build domain");

    return (atoms, domain);
}

fn run_build(mut group: BenchmarkGroup<WallTime>, pairing: PairingMode, parallel: bool) {
    for &n_atoms in black_box(&[1000, 10_000, 100_000]) {
        let (atoms, domain) = bulk_system(n_atoms);

        let mut options = NeighborOptions::new(8.0, 0.5, pairing);
        options.parallel = parallel;
        let mut engine = NeighborEngine::new(options).expect("invalid options");
        // first build outside the timing loop, to warm up the cached geometry
        engine.build(&atoms, &domain).expect("failed to build neighbor list");

        group.bench_function(&format!("n_atoms = {}", n_atoms), |b| b.iter_custom(|repeat| {
            let start = std::time::Instant::now();
            for _ in 0..repeat {
                engine.build(&atoms, &domain).expect("failed to build neighbor list");
            }
            start.elapsed() / n_atoms as u32
        }));
    }
}

fn neighbor_list_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("Neighbor list build (per atom)/half newton-on");
    group.noise_threshold(0.05);
    group.measurement_time(std::time::Duration::from_secs(10));
    group.sampling_mode(SamplingMode::Flat);
    run_build(group, PairingMode::HalfNewtonOn, false);

    let mut group = c.benchmark_group("Neighbor list build (per atom)/full");
    group.noise_threshold(0.05);
    group.measurement_time(std::time::Duration::from_secs(10));
    group.sampling_mode(SamplingMode::Flat);
    run_build(group, PairingMode::Full, false);

    let mut group = c.benchmark_group("Neighbor list build (per atom)/half newton-on, threaded");
    group.noise_threshold(0.05);
    group.measurement_time(std::time::Duration::from_secs(10));
    group.sampling_mode(SamplingMode::Flat);
    run_build(group, PairingMode::HalfNewtonOn, true);
}

criterion_group!(all, neighbor_list_build);
criterion_main!(all);
