//! ELBO and reconstruction MSE over held-out batches.
//!
//! The input is split into `eval_batch`-sized chunks (a trailing partial
//! chunk is dropped). Per chunk the bound combines four terms:
//!
//! ```text
//! ELBO = -( recon_weight * MSE
//!         + post_to_loss                 transport posterior fit
//!         + post_l1_weight * post_l1     coefficient sparsity
//!         + prior_term )                 anchor prior
//! ```
//!
//! The prior accumulator is divided by the full input length, not the chunk
//! size.

use crate::density::logsumexp;
use crate::progress::ProgressWriter;
use latro_core::{anchor_angles, images_to_tensor, rotate_random, rotate_to_angles, DigitBatch, NdBackend};
use latro_infer::{
    infer_posterior, infer_with_restarts, CoefficientSolver, RestartSchedule, TransportObjective,
};
use latro_models::{array_to_latent, latent_to_array, ModelBundle};
use latro_samplers::{gaussian_noise, LaplaceSampler, RngKey};
use nalgebra::DVector;
use ndarray::{Array2, Axis};
use std::time::Instant;

type Device = <NdBackend as burn::tensor::backend::Backend>::Device;

/// Metrics for one held-out chunk.
#[derive(Debug, Clone, Copy)]
pub struct BatchMetrics {
    pub elbo: f64,
    pub mse: f64,
    /// Wall-clock seconds spent on this chunk.
    pub seconds: f64,
}

/// Summary over all evaluated chunks.
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub per_batch: Vec<BatchMetrics>,
    pub mean_elbo: f64,
    pub mean_mse: f64,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "TestMetrics ({} batches):", self.per_batch.len())?;
        writeln!(f, "  ELBO: {:.4}", self.mean_elbo)?;
        write!(f, "  MSE:  {:.6}", self.mean_mse)
    }
}

/// Evaluate ELBO and MSE over `batch` in `eval_batch`-sized chunks.
pub fn evaluate_elbo<S: CoefficientSolver>(
    bundle: &ModelBundle,
    solver: &S,
    batch: &DigitBatch,
    key: RngKey,
    device: &Device,
    mut progress: Option<&mut ProgressWriter>,
) -> Result<MetricsSummary, String> {
    let config = &bundle.config;
    config.validate()?;

    let chunk_size = config.eval_batch;
    let n_chunks = batch.len() / chunk_size;
    if n_chunks == 0 {
        return Ok(MetricsSummary::default());
    }

    let psi = bundle.transport.dictionary().matrices();
    let m = config.n_operators;
    let d = config.latent_dim;
    let scale = config.scale;
    let total = batch.len() as f64;
    let schedule = RestartSchedule::new(config.n_restarts);
    let coeff_sampler = LaplaceSampler::from_l1_weight(config.post_l1_weight);
    let anchor_grid = anchor_angles(config.n_anchors);

    let mut elbo_values: Vec<f64> = Vec::with_capacity(n_chunks);
    let mut mse_values: Vec<f64> = Vec::with_capacity(n_chunks);
    let mut per_batch: Vec<BatchMetrics> = Vec::with_capacity(n_chunks);

    let chunk_keys = key.split(n_chunks);

    for (idx, chunk_key) in chunk_keys.into_iter().enumerate() {
        let start = Instant::now();
        let keys = chunk_key.split(5);
        let (rot_key, coeff_key, noise_key, post_key, prior_key) =
            (keys[0], keys[1], keys[2], keys[3], keys[4]);

        let images = batch
            .images
            .slice(ndarray::s![idx * chunk_size..(idx + 1) * chunk_size, .., ..])
            .to_owned();

        let (rotated, _angles) = rotate_random(&images, &mut rot_key.rng());

        let z_mu = latent_to_array(
            bundle
                .encoder
                .forward(images_to_tensor(rotated.view(), device)),
        );
        let z_mu_scale = &z_mu / scale;

        let coeffs = coeff_sampler.sample(coeff_key, chunk_size, m);
        let z_scale = bundle.transport.transport_rows(&z_mu_scale, &coeffs)
            + gaussian_noise(noise_key, chunk_size, d, config.noise_std);
        let z = &z_scale * scale;

        // Reconstruction MSE: per-image pixel mean, averaged over the chunk.
        let recon = bundle.decoder.forward(array_to_latent(&z, device));
        let recon_data: Vec<f32> = recon
            .into_data()
            .to_vec()
            .map_err(|e| format!("decoder output to host: {e:?}"))?;
        let dim = config.data_dim();
        let target_flat: Vec<f32> = rotated.iter().copied().collect();

        let mut mse = 0.0f64;
        for i in 0..chunk_size {
            let sq_err: f64 = (0..dim)
                .map(|j| {
                    let diff = recon_data[i * dim + j] as f64 - target_flat[i * dim + j] as f64;
                    diff * diff
                })
                .sum();
            mse += sq_err / dim as f64;
        }
        mse /= chunk_size as f64;

        // Posterior transport fit and sparsity penalty.
        let mut c_est = Array2::<f64>::zeros((chunk_size, m));
        let post_keys = post_key.split(chunk_size);
        for (i, pk) in post_keys.into_iter().enumerate() {
            let x0 = DVector::from_fn(d, |j, _| z_mu_scale[[i, j]]);
            let x1 = DVector::from_fn(d, |j, _| z_scale[[i, j]]);
            let objective = TransportObjective::new(x0, x1, &psi, config.post_coef_weight);
            let fit = infer_posterior(solver, &objective, pk);
            for j in 0..m {
                c_est[[i, j]] = fit.coefficients[j];
            }
        }
        let z_est_mu = bundle.transport.transport_rows(&z_mu_scale, &c_est);

        let latent_sq: f64 = (0..chunk_size)
            .map(|i| {
                (0..d)
                    .map(|j| {
                        let diff = scale * (z_scale[[i, j]] - z_est_mu[[i, j]]);
                        diff * diff
                    })
                    .sum::<f64>()
            })
            .sum();
        let post_to_loss = -0.5 * config.post_to_weight * latent_sq / chunk_size as f64;
        let post_l1_loss = -c_est.iter().map(|c| c.abs()).sum::<f64>() / chunk_size as f64;

        // Anchor prior, accumulated per image.
        let mut prior_sum = 0.0f64;
        let prior_keys = prior_key.split(chunk_size);
        for (i, ik) in prior_keys.into_iter().enumerate() {
            let source = images.index_axis(Axis(0), i);
            let anchors = rotate_to_angles(source, &anchor_grid);
            let a_mu = latent_to_array(
                bundle
                    .encoder
                    .forward(images_to_tensor(anchors.view(), device)),
            );
            let a_mu_scale = &a_mu / scale;

            let x1 = DVector::from_fn(d, |j, _| z_scale[[i, j]]);
            let anchor_keys = ik.split(config.n_anchors);

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
                        let diff = scale * (z_scale[[i, j]] - z_est_a[j]);
                        diff * diff
                    })
                    .sum();
                let l1: f64 = fit.coefficients.iter().map(|c| c.abs()).sum();

                log_contribs.push(-0.5 * config.prior_weight * sq - config.prior_l1_weight * l1);
                arc_lengths.push(fit.energy);
            }

            let log_prior = if config.closest_anchor {
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
            prior_sum -= log_prior;
        }
        let prior_term = prior_sum / total;

        let elbo = -(config.recon_weight * mse
            + post_to_loss
            + config.post_l1_weight * post_l1_loss
            + prior_term);

        let elapsed = start.elapsed().as_secs_f64();
        elbo_values.push(elbo);
        mse_values.push(mse);
        per_batch.push(BatchMetrics {
            elbo,
            mse,
            seconds: elapsed,
        });

        log::info!(
            "test-metrics: batch {}/{} ELBO={:.4} MSE={:.6} ({:.2}s)",
            idx + 1,
            n_chunks,
            elbo,
            mse,
            elapsed
        );

        if let Some(writer) = progress.as_deref_mut() {
            writer.write_elbo(idx, &elbo_values, &mse_values)?;
        }
    }

    let count = per_batch.len() as f64;
    Ok(MetricsSummary {
        mean_elbo: elbo_values.iter().sum::<f64>() / count,
        mean_mse: mse_values.iter().sum::<f64>() / count,
        per_batch,
    })
}
