//! Benchmarks for the inference hot path: matrix exponentials and full
//! coefficient solves.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use latro_infer::{expm, CoefficientSolver, ProximalDescentSolver, TransportObjective};
use latro_samplers::RngKey;
use nalgebra::{DMatrix, DVector};
use rand::Rng;

fn random_generator(d: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = RngKey::new(seed).rng();
    // Skew-symmetric part dominant, like trained rotation-style operators.
    let raw = DMatrix::from_fn(d, d, |_, _| rng.gen_range(-0.5..0.5));
    (&raw - raw.transpose()) * 0.5
}

fn benchmark_expm(c: &mut Criterion) {
    let mut group = c.benchmark_group("expm");

    for d in [4usize, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(d), d, |b, &d| {
            let a = random_generator(d, 7);
            b.iter(|| expm(black_box(&a)));
        });
    }

    group.finish();
}

fn benchmark_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("coefficient_solve");

    for m in [2usize, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(m), m, |b, &m| {
            let d = 6;
            let psi: Vec<DMatrix<f64>> =
                (0..m).map(|i| random_generator(d, i as u64)).collect();
            let x0 = DVector::from_fn(d, |i, _| (i as f64 + 1.0) / d as f64);
            let x1 = expm(&(&psi[0] * 0.4)) * &x0;
            let objective = TransportObjective::new(x0.clone(), x1, &psi, 0.01);
            let solver = ProximalDescentSolver::default();

            b.iter(|| solver.solve(black_box(&objective), DVector::zeros(m)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_expm, benchmark_solver);
criterion_main!(benches);
