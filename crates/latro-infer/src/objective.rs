//! The transport-operator inference objective.

use crate::expm::expm;
use nalgebra::{DMatrix, DVector};

/// Finite-difference step for the smooth-part gradient.
const FD_STEP: f64 = 1e-5;

/// Least-squares + L1 energy between two latent points under the dictionary.
///
/// ```text
/// f(c) = 0.5 * || expm(sum_m c_m Psi_m) x0 - x1 ||^2
/// E(c) = f(c) + l1_weight * ||c||_1
/// ```
pub struct TransportObjective<'a> {
    /// Source latent point (scaled), length d.
    pub x0: DVector<f64>,
    /// Target latent point (scaled), length d.
    pub x1: DVector<f64>,
    /// Dictionary generators, M matrices of size d x d.
    pub psi: &'a [DMatrix<f64>],
    /// L1 weight zeta.
    pub l1_weight: f64,
}

impl<'a> TransportObjective<'a> {
    pub fn new(
        x0: DVector<f64>,
        x1: DVector<f64>,
        psi: &'a [DMatrix<f64>],
        l1_weight: f64,
    ) -> Self {
        Self {
            x0,
            x1,
            psi,
            l1_weight,
        }
    }

    /// Number of coefficients M.
    pub fn n_operators(&self) -> usize {
        self.psi.len()
    }

    /// The generator `sum_m c_m Psi_m`.
    pub fn generator(&self, c: &DVector<f64>) -> DMatrix<f64> {
        let d = self.x0.len();
        let mut a = DMatrix::<f64>::zeros(d, d);
        for (m, psi_m) in self.psi.iter().enumerate() {
            a += psi_m * c[m];
        }
        a
    }

    /// Transport x0 by the coefficients: `expm(sum_m c_m Psi_m) x0`.
    pub fn transport(&self, c: &DVector<f64>) -> DVector<f64> {
        expm(&self.generator(c)) * &self.x0
    }

    /// Smooth part f(c).
    pub fn smooth(&self, c: &DVector<f64>) -> f64 {
        let residual = self.transport(c) - &self.x1;
        0.5 * residual.norm_squared()
    }

    /// Full energy E(c) = f(c) + zeta * ||c||_1.
    pub fn energy(&self, c: &DVector<f64>) -> f64 {
        self.smooth(c) + self.l1_weight * c.iter().map(|x| x.abs()).sum::<f64>()
    }

    /// Central-difference gradient of the smooth part.
    ///
    /// M is small, so 2M matrix exponentials per gradient are acceptable and
    /// sidestep the Frechet derivative of expm.
    pub fn grad_smooth(&self, c: &DVector<f64>) -> DVector<f64> {
        let m = self.n_operators();
        let mut grad = DVector::<f64>::zeros(m);
        let mut probe = c.clone();
        for i in 0..m {
            probe[i] = c[i] + FD_STEP;
            let plus = self.smooth(&probe);
            probe[i] = c[i] - FD_STEP;
            let minus = self.smooth(&probe);
            probe[i] = c[i];
            grad[i] = (plus - minus) / (2.0 * FD_STEP);
        }
        grad
    }
}
