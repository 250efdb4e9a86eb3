//! Coefficient and noise sampling.
//!
//! The variational posterior over transport-operator coefficients is a
//! factorized Laplace distribution:
//!
//! ```text
//! q(c) = prod_m (1 / 2b) * exp(-|c_m| / b),    b = 1 / l1_weight
//! ```
//!
//! [`LaplaceSampler`] draws coefficient matrices by inverse CDF:
//!
//! ```text
//! u ~ U(-0.5, 0.5),   c = -b * sign(u) * ln(1 - 2|u|)
//! ```
//!
//! The transport layer adds Gaussian latent noise on top; [`gaussian_noise`]
//! provides the keyed standard-normal draws.

use crate::rng::RngKey;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Draws i.i.d. Laplace(0, b) coefficient matrices.
#[derive(Debug, Clone, Copy)]
pub struct LaplaceSampler {
    /// Scale b of the Laplace distribution.
    pub scale: f64,
}

impl LaplaceSampler {
    /// Sampler with an explicit Laplace scale b.
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Sampler matching an L1 weight: b = 1 / l1_weight.
    pub fn from_l1_weight(l1_weight: f64) -> Self {
        Self {
            scale: 1.0 / l1_weight,
        }
    }

    /// Draw an `[n, m]` coefficient matrix.
    pub fn sample(&self, key: RngKey, n: usize, m: usize) -> Array2<f64> {
        let mut rng = key.rng();
        Array2::from_shape_fn((n, m), |_| {
            let u: f64 = rng.gen_range(-0.5..0.5);
            // max() guards the measure-zero draw at exactly -0.5.
            -self.scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
        })
    }
}

/// Draw an `[n, d]` standard-normal matrix scaled by `std`.
pub fn gaussian_noise(key: RngKey, n: usize, d: usize, std: f64) -> Array2<f64> {
    let mut rng = key.rng();
    Array2::from_shape_fn((n, d), |_| {
        let z: f64 = StandardNormal.sample(&mut rng);
        z * std
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laplace_sampler_deterministic() {
        let sampler = LaplaceSampler::from_l1_weight(1.0);
        let a = sampler.sample(RngKey::new(3), 4, 6);
        let b = sampler.sample(RngKey::new(3), 4, 6);
        assert_eq!(a, b);
    }

    #[test]
    fn test_laplace_scale_matches_mean_abs() {
        // E|c| = b for Laplace(0, b).
        let b = 0.5;
        let sampler = LaplaceSampler::new(b);
        let draws = sampler.sample(RngKey::new(11), 2000, 8);
        let mean_abs = draws.iter().map(|c| c.abs()).sum::<f64>() / draws.len() as f64;
        assert!(
            (mean_abs - b).abs() < 0.05,
            "mean |c| = {mean_abs}, expected ~{b}"
        );
    }

    #[test]
    fn test_laplace_roughly_centered() {
        let sampler = LaplaceSampler::new(1.0);
        let draws = sampler.sample(RngKey::new(5), 2000, 4);
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.1, "mean = {mean}");
    }

    #[test]
    fn test_gaussian_noise_std() {
        let noise = gaussian_noise(RngKey::new(17), 1000, 8, 0.1);
        let var = noise.iter().map(|x| x * x).sum::<f64>() / noise.len() as f64;
        assert!((var.sqrt() - 0.1).abs() < 0.01, "std = {}", var.sqrt());
    }

    #[test]
    fn test_zero_std_noise_is_zero() {
        let noise = gaussian_noise(RngKey::new(1), 3, 3, 0.0);
        assert!(noise.iter().all(|&x| x == 0.0));
    }
}
