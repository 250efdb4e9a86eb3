//! Log-density bookkeeping.
//!
//! The likelihood estimate is assembled from unnormalized energies; the
//! normalization constants are added separately so the metric can be reported
//! both ways:
//!
//! ```text
//! recon:     -D/2 ln 2pi - D ln sigma_recon,   sigma_recon = 1/sqrt(recon_weight)
//! posterior: -d/2 ln 2pi - d ln gamma - M ln(2b),   b = 1/post_l1_weight
//! prior:     same form as the posterior (shared gamma and b)
//! ```

use latro_core::EvalConfig;
use std::f64::consts::PI;

/// Numerically stable `ln(sum_i exp(x_i))`.
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Density weights and normalization constants of the likelihood estimate.
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodParams {
    /// Flattened data dimensionality D.
    pub data_dim: usize,
    /// Latent dimension d.
    pub latent_dim: usize,
    /// Dictionary size M.
    pub n_operators: usize,
    /// Importance samples per image k.
    pub n_importance: usize,
    /// Transport noise std gamma (posterior and prior Gaussian width).
    pub noise_std: f64,
    /// Reconstruction precision.
    pub recon_weight: f64,
    /// Coefficient L1 weight (posterior and prior Laplace rate).
    pub l1_weight: f64,
    /// Latent scaling.
    pub scale: f64,
}

impl LikelihoodParams {
    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            data_dim: config.data_dim(),
            latent_dim: config.latent_dim,
            n_operators: config.n_operators,
            n_importance: config.n_importance,
            noise_std: config.noise_std,
            recon_weight: config.recon_weight,
            l1_weight: config.post_l1_weight,
            scale: config.scale,
        }
    }

    /// Gaussian precision 1/gamma^2 shared by the posterior and prior
    /// transport terms.
    pub fn transport_precision(&self) -> f64 {
        1.0 / (self.noise_std * self.noise_std)
    }

    /// Laplace scale b = 1/l1_weight.
    pub fn laplace_scale(&self) -> f64 {
        1.0 / self.l1_weight
    }

    /// Reconstruction normalization constant.
    pub fn recon_log_norm(&self) -> f64 {
        let d = self.data_dim as f64;
        let sigma_recon = (1.0 / self.recon_weight).sqrt();
        -d / 2.0 * (2.0 * PI).ln() - d * sigma_recon.ln()
    }

    /// Posterior normalization constant.
    pub fn posterior_log_norm(&self) -> f64 {
        let d = self.latent_dim as f64;
        let m = self.n_operators as f64;
        -d / 2.0 * (2.0 * PI).ln() - d * self.noise_std.ln() - m * (2.0 * self.laplace_scale()).ln()
    }

    /// Prior normalization constant (same form as the posterior).
    pub fn prior_log_norm(&self) -> f64 {
        self.posterior_log_norm()
    }

    /// Offset between the constant-free and normalized estimates:
    /// recon + prior - posterior constants.
    pub fn log_norm_offset(&self) -> f64 {
        self.recon_log_norm() + self.prior_log_norm() - self.posterior_log_norm()
    }
}
