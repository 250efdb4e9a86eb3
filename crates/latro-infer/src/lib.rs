//! # latro-infer
//!
//! Sparse coefficient inference over the transport-operator dictionary.
//!
//! Given two latent points x0 and x1 and a dictionary of generators
//! Psi_1..Psi_M, inference finds the sparse coefficient vector c minimizing
//!
//! ```text
//! E(c) = 0.5 * || expm(sum_m c_m Psi_m) x0 - x1 ||^2 + zeta * ||c||_1
//! ```
//!
//! The pieces:
//!
//! - [`expm`]: scaling-and-squaring matrix exponential for the small d x d
//!   generators
//! - [`TransportObjective`]: the energy, its smooth part, and a
//!   finite-difference gradient
//! - [`CoefficientSolver`]: the solver seam; [`ProximalDescentSolver`] is the
//!   default (proximal gradient with backtracking)
//! - [`infer_with_restarts`] / [`infer_posterior`]: the restart schedules the
//!   prior and posterior terms use
//!
//! The energy of the winning restart doubles as an arc-length proxy when the
//! prior ranks anchors by proximity.

pub mod expm;
pub mod objective;
pub mod solver;

pub use expm::*;
pub use objective::*;
pub use solver::*;
