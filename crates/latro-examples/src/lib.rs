//! # latro-examples utilities
//!
//! Shared helpers for the LATRO examples: a synthetic rotated-digit
//! generator so the evaluation pipeline runs end to end without a dataset on
//! disk.

use latro_core::DigitBatch;
use latro_samplers::RngKey;
use ndarray::{Array2, Array3};
use rand::Rng;

/// Number of synthetic classes (one oriented glyph per class).
pub const N_CLASSES: usize = 10;

/// Generate `n` anti-aliased glyph images of side `img_size` with one-hot
/// labels.
///
/// Each class is a bar through the image center at a class-specific
/// orientation, with a small random thickness jitter per sample. The glyphs
/// are deliberately rotation-sensitive so anchor rotations differ from the
/// source image.
pub fn synthetic_digits(n: usize, img_size: usize, key: RngKey) -> DigitBatch {
    let mut rng = key.rng();
    let mut images = Array3::<f32>::zeros((n, img_size, img_size));
    let mut labels = Array2::<f32>::zeros((n, N_CLASSES));

    let center = (img_size as f64 - 1.0) / 2.0;

    for i in 0..n {
        let class = rng.gen_range(0..N_CLASSES);
        labels[[i, class]] = 1.0;

        let angle = class as f64 * std::f64::consts::PI / N_CLASSES as f64;
        let (sin_a, cos_a) = angle.sin_cos();
        let half_len = img_size as f64 * 0.35;
        let half_width = 1.0 + rng.gen_range(0.0..0.8);

        for r in 0..img_size {
            for c in 0..img_size {
                let dy = r as f64 - center;
                let dx = c as f64 - center;
                // Distance along and across the bar axis.
                let along = dx * cos_a + dy * sin_a;
                let across = -dx * sin_a + dy * cos_a;
                if along.abs() <= half_len {
                    // Soft edge across the bar for anti-aliasing.
                    let edge = (half_width - across.abs() + 0.5).clamp(0.0, 1.0);
                    images[[i, r, c]] = edge as f32;
                }
            }
        }
    }

    DigitBatch::new(images, labels).expect("synthetic batch shapes are consistent")
}
