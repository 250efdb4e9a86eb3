use burn::backend::ndarray::NdArrayDevice;

/// CPU backend for the evaluation stack.
///
/// The metrics are sequential numerics over small tensors, so everything runs
/// on the `ndarray` backend in f32. Coefficient inference has its own f64
/// path outside of burn.
pub type NdBackend = burn::backend::NdArray<f32>;

pub fn init_device() -> NdArrayDevice {
    NdArrayDevice::default()
}
