//! Digit dataset access.
//!
//! Batches are stored as `.npy` arrays: images `[N, H*W]` (any numeric dtype,
//! converted to f32 in `[0, 1]`) and one-hot labels `[N, L]`. Tensors for the
//! network path are built on demand.

use crate::backend::NdBackend;
use burn::tensor::Tensor;
use ndarray::{Array2, Array3, ArrayView3};
use ndarray_npy::ReadNpyExt;
use std::fs::File;
use std::path::Path;

/// Load a 2D numpy array as f32, trying the dtypes digit dumps commonly use.
pub fn load_npy_f32(path: &Path) -> Result<Array2<f32>, String> {
    if let Ok(file) = File::open(path) {
        if let Ok(arr) = Array2::<f32>::read_npy(file) {
            return Ok(arr);
        }
    }

    if let Ok(file) = File::open(path) {
        if let Ok(arr) = Array2::<f64>::read_npy(file) {
            return Ok(arr.mapv(|x| x as f32));
        }
    }

    if let Ok(file) = File::open(path) {
        if let Ok(arr) = Array2::<i32>::read_npy(file) {
            return Ok(arr.mapv(|x| x as f32));
        }
    }

    if let Ok(file) = File::open(path) {
        if let Ok(arr) = Array2::<i64>::read_npy(file) {
            return Ok(arr.mapv(|x| x as f32));
        }
    }

    if let Ok(file) = File::open(path) {
        if let Ok(arr) = Array2::<u8>::read_npy(file) {
            return Ok(arr.mapv(|x| x as f32));
        }
    }

    if let Ok(file) = File::open(path) {
        if let Ok(arr) = Array2::<bool>::read_npy(file) {
            return Ok(arr.mapv(|x| if x { 1.0 } else { 0.0 }));
        }
    }

    Err(format!(
        "failed to read {:?} - could not parse as f32, f64, i32, i64, u8, or bool",
        path
    ))
}

/// A batch of digit images with one-hot labels.
#[derive(Debug, Clone)]
pub struct DigitBatch {
    /// Images `[N, H, W]`, f32 in `[0, 1]`.
    pub images: Array3<f32>,
    /// One-hot labels `[N, L]`.
    pub labels: Array2<f32>,
}

impl DigitBatch {
    pub fn new(images: Array3<f32>, labels: Array2<f32>) -> Result<Self, String> {
        if images.dim().0 != labels.dim().0 {
            return Err(format!(
                "image/label count mismatch: {} images vs {} labels",
                images.dim().0,
                labels.dim().0
            ));
        }
        Ok(Self { images, labels })
    }

    /// Load from `.npy` files: images `[N, H*W]` reshaped to `img_size`
    /// squares, labels `[N, L]`.
    pub fn load(images_path: &Path, labels_path: &Path, img_size: usize) -> Result<Self, String> {
        let flat = load_npy_f32(images_path)?;
        let (n, dim) = flat.dim();
        if dim != img_size * img_size {
            return Err(format!(
                "image dim {} does not match img_size {} squared",
                dim, img_size
            ));
        }
        let images = flat
            .into_shape_with_order((n, img_size, img_size))
            .map_err(|e| format!("reshape images: {e}"))?;
        let labels = load_npy_f32(labels_path)?;
        Self::new(images, labels)
    }

    pub fn len(&self) -> usize {
        self.images.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Images as a `[N, 1, H, W]` network input tensor.
    pub fn images_tensor(
        &self,
        device: &<NdBackend as burn::tensor::backend::Backend>::Device,
    ) -> Tensor<NdBackend, 4> {
        images_to_tensor(self.images.view(), device)
    }

    /// The argmax class index of each label row.
    pub fn class_indices(&self) -> Vec<usize> {
        self.labels
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// Convert an `[N, H, W]` image stack into a `[N, 1, H, W]` tensor.
pub fn images_to_tensor(
    images: ArrayView3<f32>,
    device: &<NdBackend as burn::tensor::backend::Backend>::Device,
) -> Tensor<NdBackend, 4> {
    let (n, h, w) = images.dim();
    let data: Vec<f32> = images.iter().copied().collect();
    Tensor::<NdBackend, 1>::from_data(data.as_slice(), device).reshape([n, 1, h, w])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::init_device;
    use ndarray::Array3;

    #[test]
    fn test_digit_batch_shapes() {
        let images = Array3::<f32>::zeros((5, 8, 8));
        let labels = Array2::<f32>::zeros((5, 10));
        let batch = DigitBatch::new(images, labels).unwrap();
        assert_eq!(batch.len(), 5);

        let device = init_device();
        let tensor = batch.images_tensor(&device);
        assert_eq!(tensor.dims(), [5, 1, 8, 8]);
    }

    #[test]
    fn test_digit_batch_rejects_mismatch() {
        let images = Array3::<f32>::zeros((5, 8, 8));
        let labels = Array2::<f32>::zeros((4, 10));
        assert!(DigitBatch::new(images, labels).is_err());
    }

    #[test]
    fn test_class_indices() {
        let images = Array3::<f32>::zeros((2, 4, 4));
        let mut labels = Array2::<f32>::zeros((2, 3));
        labels[[0, 2]] = 1.0;
        labels[[1, 0]] = 1.0;
        let batch = DigitBatch::new(images, labels).unwrap();
        assert_eq!(batch.class_indices(), vec![2, 0]);
    }

    #[test]
    fn test_images_to_tensor_layout() {
        let mut images = Array3::<f32>::zeros((1, 2, 3));
        images[[0, 1, 2]] = 0.5;
        let device = init_device();
        let tensor = images_to_tensor(images.view(), &device);
        let data: Vec<f32> = tensor.into_data().to_vec().unwrap();
        assert_eq!(data.len(), 6);
        assert!((data[5] - 0.5).abs() < 1e-6);
    }
}
