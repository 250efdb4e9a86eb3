//! Transport-operator layer.
//!
//! The dictionary holds M learned generators Psi_m (d x d, f64). Transporting
//! a latent point z by a coefficient row c applies the matrix exponential of
//! the weighted generator sum:
//!
//! ```text
//! T(c) z = expm(sum_m c_m Psi_m) z + noise_std * eps,   eps ~ N(0, I)
//! ```
//!
//! The exponential path runs in f64 (nalgebra); the tensor boundary back to
//! the f32 network path is explicit.

use burn::tensor::Tensor;
use latro_core::NdBackend;
use latro_infer::expm;
use latro_samplers::{gaussian_noise, RngKey};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array3};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::File;
use std::path::Path;

type Device = <NdBackend as burn::tensor::backend::Backend>::Device;

/// The learned dictionary Psi `[M, d, d]`.
#[derive(Debug, Clone)]
pub struct OperatorDictionary {
    psi: Array3<f64>,
}

impl OperatorDictionary {
    pub fn new(psi: Array3<f64>) -> Result<Self, String> {
        let (_, d1, d2) = psi.dim();
        if d1 != d2 {
            return Err(format!("dictionary elements must be square, got {d1}x{d2}"));
        }
        Ok(Self { psi })
    }

    /// Small random skew-symmetric generators, for freshly initialized
    /// bundles (no checkpoint on disk).
    pub fn random_init(key: RngKey, n_operators: usize, latent_dim: usize) -> Self {
        use rand::Rng;
        let mut rng = key.rng();
        let mut psi = Array3::<f64>::zeros((n_operators, latent_dim, latent_dim));
        for m in 0..n_operators {
            for i in 0..latent_dim {
                for j in 0..i {
                    let v: f64 = rng.gen_range(-0.1..0.1);
                    psi[[m, i, j]] = v;
                    psi[[m, j, i]] = -v;
                }
            }
        }
        Self { psi }
    }

    /// Number of dictionary elements M.
    pub fn len(&self) -> usize {
        self.psi.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latent dimension d.
    pub fn latent_dim(&self) -> usize {
        self.psi.dim().1
    }

    /// The generators as nalgebra matrices for the inference path.
    pub fn matrices(&self) -> Vec<DMatrix<f64>> {
        let (m, d, _) = self.psi.dim();
        (0..m)
            .map(|k| DMatrix::from_fn(d, d, |i, j| self.psi[[k, i, j]]))
            .collect()
    }

    pub fn save_npy(&self, path: &Path) -> Result<(), String> {
        let file = File::create(path).map_err(|e| format!("create {:?}: {e}", path))?;
        self.psi
            .write_npy(file)
            .map_err(|e| format!("write {:?}: {e}", path))
    }

    pub fn load_npy(path: &Path) -> Result<Self, String> {
        let file = File::open(path).map_err(|e| format!("open {:?}: {e}", path))?;
        let psi =
            Array3::<f64>::read_npy(file).map_err(|e| format!("read {:?}: {e}", path))?;
        Self::new(psi)
    }
}

/// The transport layer over a dictionary.
#[derive(Debug, Clone)]
pub struct TransportOperator {
    dictionary: OperatorDictionary,
}

impl TransportOperator {
    pub fn new(dictionary: OperatorDictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &OperatorDictionary {
        &self.dictionary
    }

    /// Transport every latent row by its coefficient row and add Gaussian
    /// noise of standard deviation `noise_std`.
    ///
    /// `latents` is `[N, d]`, `coeffs` is `[N, M]`.
    pub fn apply(
        &self,
        latents: Tensor<NdBackend, 2>,
        coeffs: &Array2<f64>,
        noise_std: f64,
        key: RngKey,
        device: &Device,
    ) -> Tensor<NdBackend, 2> {
        let [n, d] = latents.dims();
        let transported = self.transport_rows(&latent_to_array(latents), coeffs);

        let with_noise = if noise_std > 0.0 {
            let noise = gaussian_noise(key, n, d, noise_std);
            transported + &noise
        } else {
            transported
        };

        array_to_latent(&with_noise, device)
    }

    /// The noise-free transport, used when re-transporting by inferred
    /// coefficients.
    pub fn apply_deterministic(
        &self,
        latents: Tensor<NdBackend, 2>,
        coeffs: &Array2<f64>,
        device: &Device,
    ) -> Tensor<NdBackend, 2> {
        let transported = self.transport_rows(&latent_to_array(latents), coeffs);
        array_to_latent(&transported, device)
    }

    /// Row-wise f64 transport: `out_i = expm(sum_m c_im Psi_m) z_i`.
    pub fn transport_rows(&self, latents: &Array2<f64>, coeffs: &Array2<f64>) -> Array2<f64> {
        let (n, d) = latents.dim();
        let (cn, cm) = coeffs.dim();
        assert_eq!(n, cn, "latent rows ({n}) and coefficient rows ({cn}) must match");
        assert_eq!(
            cm,
            self.dictionary.len(),
            "coefficient columns must match dictionary size"
        );
        assert_eq!(d, self.dictionary.latent_dim());

        let psi = self.dictionary.matrices();
        let mut out = Array2::<f64>::zeros((n, d));

        for i in 0..n {
            let mut generator = DMatrix::<f64>::zeros(d, d);
            for (m, psi_m) in psi.iter().enumerate() {
                generator += psi_m * coeffs[[i, m]];
            }
            let z = DVector::from_fn(d, |j, _| latents[[i, j]]);
            let transported = expm(&generator) * z;
            for j in 0..d {
                out[[i, j]] = transported[j];
            }
        }

        out
    }
}

/// Pull a `[N, d]` latent tensor into an f64 array.
pub fn latent_to_array(latents: Tensor<NdBackend, 2>) -> Array2<f64> {
    let [n, d] = latents.dims();
    let data: Vec<f32> = latents
        .into_data()
        .to_vec()
        .expect("latent tensor to host");
    Array2::from_shape_fn((n, d), |(i, j)| data[i * d + j] as f64)
}

/// Push an f64 array back into a `[N, d]` latent tensor.
pub fn array_to_latent(array: &Array2<f64>, device: &Device) -> Tensor<NdBackend, 2> {
    let (n, d) = array.dim();
    let data: Vec<f32> = array.iter().map(|&x| x as f32).collect();
    Tensor::<NdBackend, 1>::from_data(data.as_slice(), device).reshape([n, d])
}

#[cfg(test)]
mod tests {
    use super::*;
    use latro_core::init_device;

    fn rotation_dictionary() -> OperatorDictionary {
        let mut psi = Array3::<f64>::zeros((1, 2, 2));
        psi[[0, 0, 1]] = -1.0;
        psi[[0, 1, 0]] = 1.0;
        OperatorDictionary::new(psi).unwrap()
    }

    #[test]
    fn test_dictionary_rejects_non_square() {
        let psi = Array3::<f64>::zeros((2, 3, 4));
        assert!(OperatorDictionary::new(psi).is_err());
    }

    #[test]
    fn test_zero_coefficients_identity() {
        let transport = TransportOperator::new(rotation_dictionary());
        let z = ndarray::array![[0.3, -0.7]];
        let c = Array2::<f64>::zeros((1, 1));
        let out = transport.transport_rows(&z, &c);
        assert!((out[[0, 0]] - 0.3).abs() < 1e-12);
        assert!((out[[0, 1]] + 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_transport() {
        let transport = TransportOperator::new(rotation_dictionary());
        let theta = 0.5f64;
        let z = ndarray::array![[1.0, 0.0]];
        let c = ndarray::array![[theta]];
        let out = transport.transport_rows(&z, &c);
        assert!((out[[0, 0]] - theta.cos()).abs() < 1e-10);
        assert!((out[[0, 1]] - theta.sin()).abs() < 1e-10);
    }

    #[test]
    fn test_apply_noise_free_matches_rows() {
        let device = init_device();
        let transport = TransportOperator::new(rotation_dictionary());
        let z = array_to_latent(&ndarray::array![[1.0, 0.0], [0.0, 1.0]], &device);
        let c = ndarray::array![[0.25], [0.25]];

        let out = transport.apply(z.clone(), &c, 0.0, RngKey::new(0), &device);
        let direct = transport.transport_rows(&latent_to_array(z), &c);

        let out_arr = latent_to_array(out);
        for (a, b) in out_arr.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_apply_noise_is_keyed() {
        let device = init_device();
        let transport = TransportOperator::new(rotation_dictionary());
        let z = array_to_latent(&ndarray::array![[1.0, 0.0]], &device);
        let c = ndarray::array![[0.1]];

        let a = transport.apply(z.clone(), &c, 0.05, RngKey::new(9), &device);
        let b = transport.apply(z.clone(), &c, 0.05, RngKey::new(9), &device);
        let c2 = transport.apply(z, &c, 0.05, RngKey::new(10), &device);

        let av: Vec<f32> = a.into_data().to_vec().unwrap();
        let bv: Vec<f32> = b.into_data().to_vec().unwrap();
        let cv: Vec<f32> = c2.into_data().to_vec().unwrap();
        assert_eq!(av, bv);
        assert_ne!(av, cv);
    }

    #[test]
    fn test_dictionary_npy_roundtrip() {
        let dict = OperatorDictionary::random_init(RngKey::new(3), 4, 6);
        let dir = std::env::temp_dir().join("latro_test_dict");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("psi.npy");

        dict.save_npy(&path).unwrap();
        let loaded = OperatorDictionary::load_npy(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.latent_dim(), 6);
        assert_eq!(dict.psi, loaded.psi);

        std::fs::remove_file(&path).ok();
    }
}
