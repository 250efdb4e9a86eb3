//! Coefficient solvers and restart schedules.
//!
//! The solver sits behind [`CoefficientSolver`] so the metric layer never
//! depends on a particular optimizer. The default is proximal gradient
//! descent (ISTA): a backtracking gradient step on the smooth part followed
//! by the soft-threshold prox of the L1 term.

use crate::objective::TransportObjective;
use latro_samplers::RngKey;
use nalgebra::DVector;
use rand::Rng;

/// Result of a coefficient inference run.
#[derive(Debug, Clone)]
pub struct CoefficientFit {
    /// The inferred coefficients, length M.
    pub coefficients: DVector<f64>,
    /// Final energy E(c); doubles as the arc-length proxy for anchor ranking.
    pub energy: f64,
    /// Iterations taken.
    pub iterations: usize,
}

/// Solver seam: minimize a [`TransportObjective`] from a starting point.
pub trait CoefficientSolver {
    fn solve(&self, objective: &TransportObjective<'_>, c0: DVector<f64>) -> CoefficientFit;
}

/// Proximal gradient descent with Armijo backtracking.
#[derive(Debug, Clone, Copy)]
pub struct ProximalDescentSolver {
    /// Maximum iterations.
    pub max_iters: usize,
    /// Relative energy-change stopping tolerance.
    pub tol: f64,
    /// Initial gradient step size.
    pub initial_step: f64,
}

impl Default for ProximalDescentSolver {
    fn default() -> Self {
        Self {
            max_iters: 200,
            tol: 1e-9,
            initial_step: 1.0,
        }
    }
}

impl ProximalDescentSolver {
    /// One backtracked proximal step from `c`. Returns the accepted point and
    /// the step size that passed the sufficient-decrease test.
    fn step(
        &self,
        objective: &TransportObjective<'_>,
        c: &DVector<f64>,
        f_c: f64,
        grad: &DVector<f64>,
        mut step: f64,
    ) -> (DVector<f64>, f64) {
        const MIN_STEP: f64 = 1e-12;

        loop {
            let candidate = soft_threshold(&(c - grad * step), step * objective.l1_weight);
            let delta = &candidate - c;
            let quad_bound = f_c + grad.dot(&delta) + delta.norm_squared() / (2.0 * step);
            if objective.smooth(&candidate) <= quad_bound || step <= MIN_STEP {
                return (candidate, step);
            }
            step *= 0.5;
        }
    }
}

impl CoefficientSolver for ProximalDescentSolver {
    fn solve(&self, objective: &TransportObjective<'_>, c0: DVector<f64>) -> CoefficientFit {
        let mut c = c0;
        let mut energy = objective.energy(&c);
        let mut step = self.initial_step;
        let mut iterations = 0;

        for iter in 0..self.max_iters {
            iterations = iter + 1;
            let f_c = objective.smooth(&c);
            let grad = objective.grad_smooth(&c);

            let (next, used_step) = self.step(objective, &c, f_c, &grad, step);
            let next_energy = objective.energy(&next);

            // Mild step growth so one conservative backtrack doesn't pin the
            // step size for the rest of the run.
            step = used_step * 1.2;

            let improvement = energy - next_energy;
            c = next;
            energy = next_energy;

            if improvement.abs() <= self.tol * energy.abs().max(1.0) {
                break;
            }
        }

        CoefficientFit {
            coefficients: c,
            energy,
            iterations,
        }
    }
}

/// Elementwise soft threshold: `sign(x) * max(|x| - tau, 0)`.
pub fn soft_threshold(x: &DVector<f64>, tau: f64) -> DVector<f64> {
    x.map(|v| v.signum() * (v.abs() - tau).max(0.0))
}

/// Restart seeding for prior coefficient inference.
///
/// Restart r draws the starting point uniformly from
/// `[-5 + 5r, -5 + 5r + 5]`, sweeping the initialization across the
/// coefficient range one window at a time.
#[derive(Debug, Clone, Copy)]
pub struct RestartSchedule {
    pub n_restarts: usize,
}

impl RestartSchedule {
    pub fn new(n_restarts: usize) -> Self {
        Self { n_restarts }
    }

    /// Seed window for restart `r`.
    pub fn seed_range(&self, r: usize) -> (f64, f64) {
        let lo = -5.0 + 5.0 * r as f64;
        (lo, lo + 5.0)
    }
}

/// Uniform starting point in `[lo, hi)` per coefficient.
fn seed_uniform(key: RngKey, m: usize, lo: f64, hi: f64) -> DVector<f64> {
    let mut rng = key.rng();
    DVector::from_fn(m, |_, _| rng.gen_range(lo..hi))
}

/// Run every restart in the schedule and keep the minimum-energy fit.
///
/// Also returns the per-restart energies; the winning energy is the anchor
/// ranking key for the closest-anchor prior.
pub fn infer_with_restarts<S: CoefficientSolver>(
    solver: &S,
    objective: &TransportObjective<'_>,
    schedule: RestartSchedule,
    key: RngKey,
) -> (CoefficientFit, Vec<f64>) {
    let m = objective.n_operators();
    let keys = key.split(schedule.n_restarts.max(1));

    let mut best: Option<CoefficientFit> = None;
    let mut energies = Vec::with_capacity(schedule.n_restarts.max(1));

    for (r, restart_key) in keys.into_iter().enumerate() {
        let (lo, hi) = schedule.seed_range(r);
        let c0 = seed_uniform(restart_key, m, lo, hi);
        let fit = solver.solve(objective, c0);
        energies.push(fit.energy);

        let better = best.as_ref().map(|b| fit.energy < b.energy).unwrap_or(true);
        if better {
            best = Some(fit);
        }
    }

    (
        best.expect("restart schedule produced at least one fit"),
        energies,
    )
}

/// Posterior inference: a single solve seeded uniformly from `[0, 1)`.
pub fn infer_posterior<S: CoefficientSolver>(
    solver: &S,
    objective: &TransportObjective<'_>,
    key: RngKey,
) -> CoefficientFit {
    let c0 = seed_uniform(key, objective.n_operators(), 0.0, 1.0);
    solver.solve(objective, c0)
}
