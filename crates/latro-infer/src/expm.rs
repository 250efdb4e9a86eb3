//! Matrix exponential via scaling and squaring.
//!
//! The transport generators are small (latent dimension squared), dense, and
//! generally non-symmetric, so the classic Pade(6) scaling-and-squaring
//! scheme is accurate and fast enough for the inner inference loop:
//!
//! ```text
//! expm(A) = (expm(A / 2^s))^(2^s),    ||A / 2^s||_1 <= 0.5
//! ```
//!
//! with each scaled exponential approximated by the diagonal Pade(6)
//! rational N(A) / D(A).

use nalgebra::DMatrix;

/// Degree of the diagonal Pade approximant.
const PADE_DEGREE: usize = 6;

/// Scaling threshold on the 1-norm of the scaled matrix.
const SCALE_TARGET: f64 = 0.5;

/// Compute `expm(a)` for a square matrix.
pub fn expm(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "expm requires a square matrix, got {}x{}", n, a.ncols());

    let norm = one_norm(a);
    if norm == 0.0 {
        return DMatrix::identity(n, n);
    }

    // Scale A down until its 1-norm is below the Pade radius.
    let s = if norm > SCALE_TARGET {
        (norm / SCALE_TARGET).log2().ceil() as u32
    } else {
        0
    };
    let scaled = a / 2f64.powi(s as i32);

    let mut result = pade6(&scaled);
    for _ in 0..s {
        result = &result * &result;
    }
    result
}

/// Diagonal Pade(6) approximant N(A) / D(A) of expm(A).
fn pade6(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.nrows();
    let identity = DMatrix::<f64>::identity(n, n);

    // c_0 = 1, c_j = c_{j-1} * (p - j + 1) / (j * (2p - j + 1))
    let mut c = 1.0;
    let mut numer = identity.clone();
    let mut denom = identity.clone();
    let mut power = identity;

    for j in 1..=PADE_DEGREE {
        c *= (PADE_DEGREE - j + 1) as f64 / (j * (2 * PADE_DEGREE - j + 1)) as f64;
        power = &power * a;
        numer += &power * c;
        if j % 2 == 0 {
            denom += &power * c;
        } else {
            denom -= &power * c;
        }
    }

    denom
        .lu()
        .solve(&numer)
        .expect("Pade denominator is nonsingular for scaled matrices")
}

/// Maximum absolute column sum.
fn one_norm(a: &DMatrix<f64>) -> f64 {
    (0..a.ncols())
        .map(|j| a.column(j).iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}
