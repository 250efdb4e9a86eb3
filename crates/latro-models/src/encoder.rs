//! Convolutional encoder: image to latent mean.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for the [`Encoder`].
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Image side length (inputs are `[N, 1, img_size, img_size]`).
    pub img_size: usize,
    /// Latent dimension d.
    pub latent_dim: usize,
    /// Channel widths of the two conv stages.
    pub channels: [usize; 2],
}

impl EncoderConfig {
    pub fn new(img_size: usize, latent_dim: usize) -> Self {
        Self {
            img_size,
            latent_dim,
            channels: [32, 64],
        }
    }

    /// Feature-map side length after the two stride-2 convolutions.
    pub fn feature_side(&self) -> usize {
        let s1 = (self.img_size + 2 - 3) / 2 + 1;
        (s1 + 2 - 3) / 2 + 1
    }
}

/// Maps `[N, 1, H, W]` images to latent means `[N, d]`.
///
/// Two stride-2 3x3 convolutions, then a linear head over the flattened
/// feature map. The output is the posterior mean the transport-operator
/// posterior is built around; there is no log-variance head, the posterior
/// spread comes from the coefficient distribution.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    head: nn::Linear<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &EncoderConfig, device: &B::Device) -> Self {
        let [c1, c2] = config.channels;
        let conv1 = Conv2dConfig::new([1, c1], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = Conv2dConfig::new([c1, c2], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let side = config.feature_side();
        let head = nn::LinearConfig::new(c2 * side * side, config.latent_dim).init(device);

        Self { conv1, conv2, head }
    }

    /// Latent means `[N, d]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(images));
        let x = relu(self.conv2.forward(x));
        let x = x.flatten::<2>(1, 3);
        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use latro_core::{init_device, NdBackend};

    #[test]
    fn test_feature_side() {
        let config = EncoderConfig::new(28, 6);
        assert_eq!(config.feature_side(), 7);
    }

    #[test]
    fn test_encoder_output_shape() {
        let device = init_device();
        let config = EncoderConfig::new(28, 6);
        let encoder = Encoder::<NdBackend>::new(&config, &device);

        let images = Tensor::random([4, 1, 28, 28], Distribution::Uniform(0.0, 1.0), &device);
        let z = encoder.forward(images);
        assert_eq!(z.dims(), [4, 6]);
    }

    #[test]
    fn test_encoder_deterministic_forward() {
        let device = init_device();
        let config = EncoderConfig::new(16, 4);
        let encoder = Encoder::<NdBackend>::new(&config, &device);

        let images = Tensor::random([2, 1, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
        let a: Vec<f32> = encoder
            .forward(images.clone())
            .into_data()
            .to_vec()
            .unwrap();
        let b: Vec<f32> = encoder.forward(images).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
