//! Importance-sampled log-likelihood on rotated digits.
//!
//! For each test image the estimator draws k latent samples through the
//! transport posterior, infers the coefficient paths that explain them, and
//! reduces the importance weights with log-sum-exp:
//!
//! ```text
//! LL(x) = logsumexp_k( log p(x|z_k) + log p(z_k) - log q(z_k|x) ) - ln k
//! ```
//!
//! Every random draw is keyed, so a run is reproducible from its seed.

use crate::density::{logsumexp, LikelihoodParams};
use crate::progress::ProgressWriter;
use itertools::izip;
use latro_core::{anchor_angles, images_to_tensor, rotate_image, rotate_to_angles, DigitBatch, NdBackend};
use latro_infer::{
    infer_posterior, infer_with_restarts, CoefficientSolver, RestartSchedule, TransportObjective,
};
use latro_models::{array_to_latent, latent_to_array, ModelBundle};
use latro_samplers::{gaussian_noise, LaplaceSampler, RngKey};
use nalgebra::DVector;
use ndarray::{Array2, Axis};
use rand::Rng;
use std::time::Instant;

type Device = <NdBackend as burn::tensor::backend::Backend>::Device;

/// Log-likelihood estimate for one test image.
#[derive(Debug, Clone, Copy)]
pub struct SampleLikelihood {
    /// Estimate without normalization constants.
    pub raw: f64,
    /// Estimate with the Gaussian/Laplace constants added.
    pub with_constants: f64,
    /// Wall-clock seconds spent on this image.
    pub seconds: f64,
}

/// Summary over an evaluation batch.
#[derive(Debug, Clone, Default)]
pub struct LikelihoodSummary {
    pub per_image: Vec<SampleLikelihood>,
    pub mean_raw: f64,
    pub mean_with_constants: f64,
}

impl std::fmt::Display for LikelihoodSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "LogLikelihood ({} images):", self.per_image.len())?;
        writeln!(f, "  LL:       {:.4}", self.mean_with_constants)?;
        write!(f, "  LL (raw): {:.4}", self.mean_raw)
    }
}

/// Estimate the data log-likelihood of every image in `batch`.
///
/// The per-image procedure:
/// 1. rotate the digit by a uniform random angle (the evaluation view)
/// 2. encode the rotated target and the evenly spaced anchor rotations
/// 3. draw k coefficient rows, transport the encoded mean with noise
/// 4. reconstruction term from the decoder residual
/// 5. posterior term from single-restart coefficient inference mean -> sample
/// 6. prior term from multi-restart inference anchor -> sample, either
///    averaged over anchors or restricted to the closest one
pub fn estimate_log_likelihood<S: CoefficientSolver>(
    bundle: &ModelBundle,
    solver: &S,
    batch: &DigitBatch,
    key: RngKey,
    device: &Device,
    mut progress: Option<&mut ProgressWriter>,
) -> Result<LikelihoodSummary, String> {
    if batch.is_empty() {
        return Ok(LikelihoodSummary::default());
    }

    let config = &bundle.config;
    config.validate()?;
    let params = LikelihoodParams::from_config(config);
    let psi = bundle.transport.dictionary().matrices();

    let k = config.n_importance;
    let m = config.n_operators;
    let d = config.latent_dim;
    let scale = config.scale;
    let precision = params.transport_precision();
    let schedule = RestartSchedule::new(config.n_restarts);
    let coeff_sampler = LaplaceSampler::from_l1_weight(config.post_l1_weight);

    let mut raw_values: Vec<f64> = Vec::with_capacity(batch.len());
    let mut norm_values: Vec<f64> = Vec::with_capacity(batch.len());
    let mut seconds: Vec<f64> = Vec::with_capacity(batch.len());
    let mut per_image: Vec<SampleLikelihood> = Vec::with_capacity(batch.len());

    let image_keys = key.split(batch.len());

    for (n, image_key) in image_keys.into_iter().enumerate() {
        let start = Instant::now();
        let keys = image_key.split(5);
        let (rot_key, coeff_key, noise_key, post_key, prior_key) =
            (keys[0], keys[1], keys[2], keys[3], keys[4]);

        let image = batch.images.index_axis(Axis(0), n);

        // Evaluation view: the digit under a random rotation.
        let angle: f64 = rot_key.rng().gen_range(0.0..360.0);
        let rotated = rotate_image(image, angle);

        // Anchors are rotations of the un-rotated source digit.
        let anchors = rotate_to_angles(image, &anchor_angles(config.n_anchors));
        let a_mu = latent_to_array(
            bundle
                .encoder
                .forward(images_to_tensor(anchors.view(), device)),
        );
        let a_mu_scale = &a_mu / scale;

        let target_stack = rotated.clone().insert_axis(Axis(0));
        let z_mu = latent_to_array(
            bundle
                .encoder
                .forward(images_to_tensor(target_stack.view(), device)),
        );
        let z_mu_scale = &z_mu / scale;

        // k transported samples around the encoded mean.
        let z_mu_repeat = Array2::from_shape_fn((k, d), |(_, j)| z_mu_scale[[0, j]]);
        let coeffs = coeff_sampler.sample(coeff_key, k, m);
        let z_scale = bundle.transport.transport_rows(&z_mu_repeat, &coeffs)
            + gaussian_noise(noise_key, k, d, config.noise_std);
        let z = &z_scale * scale;

        // Reconstruction energies from the decoder residual.
        let recon = bundle.decoder.forward(array_to_latent(&z, device));
        let recon_data: Vec<f32> = recon
            .into_data()
            .to_vec()
            .map_err(|e| format!("decoder output to host: {e:?}"))?;
        let target_flat: Vec<f32> = rotated.iter().copied().collect();
        let dim = target_flat.len();

        let mut log_p_x: Vec<f64> = Vec::with_capacity(k);
        for b in 0..k {
            let sq_err: f64 = (0..dim)
                .map(|j| {
                    let diff = recon_data[b * dim + j] as f64 - target_flat[j] as f64;
                    diff * diff
                })
                .sum();
            log_p_x.push(-0.5 * config.recon_weight * sq_err);
        }

        // Posterior energies: infer the coefficient path mean -> sample.
        let x0_mu = DVector::from_fn(d, |j, _| z_mu_scale[[0, j]]);
        let mut c_est = Array2::<f64>::zeros((k, m));
        let post_keys = post_key.split(k);
        for (b, pk) in post_keys.into_iter().enumerate() {
            let x1 = DVector::from_fn(d, |j, _| z_scale[[b, j]]);
            let objective =
                TransportObjective::new(x0_mu.clone(), x1, &psi, config.post_coef_weight);
            let fit = infer_posterior(solver, &objective, pk);
            for i in 0..m {
                c_est[[b, i]] = fit.coefficients[i];
            }
        }
        let z_est_mu = bundle.transport.transport_rows(&z_mu_repeat, &c_est);

        let mut log_q: Vec<f64> = Vec::with_capacity(k);
        for b in 0..k {
            let sq: f64 = (0..d)
                .map(|j| {
                    let diff = scale * (z_scale[[b, j]] - z_est_mu[[b, j]]);
                    diff * diff
                })
                .sum();
            let l1: f64 = (0..m).map(|i| c_est[[b, i]].abs()).sum();
            log_q.push(-0.5 * precision * sq - config.post_l1_weight * l1);
        }

        // Prior energies: anchor -> sample with restarts.
        let mut log_p_z: Vec<f64> = Vec::with_capacity(k);
        let prior_keys = prior_key.split(k);
        for (b, bk) in prior_keys.into_iter().enumerate() {
            let x1 = DVector::from_fn(d, |j, _| z_scale[[b, j]]);
            let anchor_keys = bk.split(config.n_anchors);

            let mut log_contribs: Vec<f64> = Vec::with_capacity(config.n_anchors);
            let mut arc_lengths: Vec<f64> = Vec::with_capacity(config.n_anchors);

            for (a, ak) in anchor_keys.into_iter().enumerate() {
                let x0 = DVector::from_fn(d, |j, _| a_mu_scale[[a, j]]);
                let objective =
                    TransportObjective::new(x0, x1.clone(), &psi, config.prior_coef_weight);
                let (fit, _energies) = infer_with_restarts(solver, &objective, schedule, ak);

                let z_est_a = objective.transport(&fit.coefficients);
                let sq: f64 = (0..d)
                    .map(|j| {
                        let diff = scale * (z_scale[[b, j]] - z_est_a[j]);
                        diff * diff
                    })
                    .sum();
                let l1: f64 = fit.coefficients.iter().map(|c| c.abs()).sum();

                log_contribs.push(-0.5 * precision * sq - config.post_l1_weight * l1);
                arc_lengths.push(fit.energy);
            }

            let value = if config.closest_anchor {
                let nearest = arc_lengths
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                log_contribs[nearest]
            } else {
                logsumexp(&log_contribs) - (config.n_anchors as f64).ln()
            };
            log_p_z.push(value);
        }

        // Importance-weighted reduction over the k samples.
        let terms: Vec<f64> = izip!(&log_p_x, &log_p_z, &log_q)
            .map(|(px, pz, q)| px + pz - q)
            .collect();
        let raw = logsumexp(&terms) - (k as f64).ln();
        let with_constants = raw + params.log_norm_offset();

        let elapsed = start.elapsed().as_secs_f64();
        raw_values.push(raw);
        norm_values.push(with_constants);
        seconds.push(elapsed);
        per_image.push(SampleLikelihood {
            raw,
            with_constants,
            seconds: elapsed,
        });

        log::info!(
            "log-likelihood: image {}/{} LL={:.4} ({:.2}s)",
            n + 1,
            batch.len(),
            with_constants,
            elapsed
        );

        if let Some(writer) = progress.as_deref_mut() {
            writer.write_likelihood(n, &raw_values, &norm_values, &seconds)?;
        }
    }

    let count = per_image.len() as f64;
    Ok(LikelihoodSummary {
        mean_raw: raw_values.iter().sum::<f64>() / count,
        mean_with_constants: norm_values.iter().sum::<f64>() / count,
        per_image,
    })
}
