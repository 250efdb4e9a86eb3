//! End-to-end metric runs on a synthetic digit batch: checkpoint round-trip,
//! both metrics, and progress files on disk.

use latro_core::{init_device, DigitBatch, EvalConfig};
use latro_infer::ProximalDescentSolver;
use latro_metrics::{estimate_log_likelihood, evaluate_elbo, ProgressWriter};
use latro_models::ModelBundle;
use latro_samplers::RngKey;
use ndarray::{Array2, Array3};

fn test_config() -> EvalConfig {
    let mut config = EvalConfig::default();
    config.img_size = 16;
    config.latent_dim = 3;
    config.n_operators = 2;
    config.n_anchors = 2;
    config.n_restarts = 1;
    config.n_importance = 2;
    config.eval_batch = 2;
    config.scale = 5.0;
    config.noise_std = 0.1;
    config
}

fn synthetic_batch(n: usize, size: usize) -> DigitBatch {
    // Off-center bright bar so rotations actually differ.
    let images = Array3::from_shape_fn((n, size, size), |(i, r, c)| {
        let bar = if r > size / 4 && r < size / 2 && c > size / 3 {
            0.9
        } else {
            0.05
        };
        (bar + i as f32 * 0.01).min(1.0)
    });
    let labels = Array2::<f32>::zeros((n, 10));
    DigitBatch::new(images, labels).unwrap()
}

fn fast_solver() -> ProximalDescentSolver {
    ProximalDescentSolver {
        max_iters: 15,
        ..Default::default()
    }
}

#[test]
fn metrics_run_against_saved_checkpoint() {
    let device = init_device();
    let dir = std::env::temp_dir().join("latro_e2e_checkpoint");

    let bundle = ModelBundle::fresh(test_config(), RngKey::new(1), &device).unwrap();
    bundle.save(&dir).unwrap();
    let loaded = ModelBundle::load(&dir, &device).unwrap();

    let batch = synthetic_batch(2, 16);
    let solver = fast_solver();

    let ll = estimate_log_likelihood(&loaded, &solver, &batch, RngKey::new(2), &device, None)
        .unwrap();
    assert_eq!(ll.per_image.len(), 2);
    assert!(ll.mean_with_constants.is_finite());

    // Same weights, same key: the saved and in-memory bundles agree.
    let ll_orig =
        estimate_log_likelihood(&bundle, &solver, &batch, RngKey::new(2), &device, None).unwrap();
    assert!((ll.mean_raw - ll_orig.mean_raw).abs() < 1e-9);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn elbo_and_likelihood_write_progress_files() {
    let device = init_device();
    let out_dir = std::env::temp_dir().join("latro_e2e_progress");

    let bundle = ModelBundle::fresh(test_config(), RngKey::new(3), &device).unwrap();
    let batch = synthetic_batch(2, 16);
    let solver = fast_solver();

    let mut writer = ProgressWriter::new(&out_dir, batch.len(), bundle.config.n_importance).unwrap();
    estimate_log_likelihood(
        &bundle,
        &solver,
        &batch,
        RngKey::new(4),
        &device,
        Some(&mut writer),
    )
    .unwrap();

    assert!(out_dir.join("test_metrics_batch2_2samp_ll.npy").exists());
    assert!(out_dir.join("test_metrics_batch2_2samp_progress.json").exists());

    let mut writer = ProgressWriter::new(&out_dir, batch.len(), bundle.config.n_importance).unwrap();
    let summary = evaluate_elbo(
        &bundle,
        &solver,
        &batch,
        RngKey::new(5),
        &device,
        Some(&mut writer),
    )
    .unwrap();
    assert_eq!(summary.per_batch.len(), 1);
    assert!(out_dir.join("test_metrics_batch2_2samp_elbo.npy").exists());

    std::fs::remove_dir_all(&out_dir).ok();
}

#[test]
fn closest_anchor_prior_also_runs() {
    let device = init_device();
    let mut config = test_config();
    config.closest_anchor = true;

    let bundle = ModelBundle::fresh(config, RngKey::new(6), &device).unwrap();
    let batch = synthetic_batch(1, 16);
    let solver = fast_solver();

    let ll = estimate_log_likelihood(&bundle, &solver, &batch, RngKey::new(7), &device, None)
        .unwrap();
    assert!(ll.per_image[0].raw.is_finite());
}
