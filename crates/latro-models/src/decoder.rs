//! Transposed-convolutional decoder: latent to image.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for the [`Decoder`].
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Output image side length.
    pub img_size: usize,
    /// Latent dimension d.
    pub latent_dim: usize,
    /// Channel widths: stem features, then the two upsampling stages.
    pub channels: [usize; 3],
}

impl DecoderConfig {
    pub fn new(img_size: usize, latent_dim: usize) -> Result<Self, String> {
        if img_size % 4 != 0 {
            return Err(format!(
                "decoder upsamples 4x, img_size must be divisible by 4, got {img_size}"
            ));
        }
        Ok(Self {
            img_size,
            latent_dim,
            channels: [64, 32, 16],
        })
    }

    /// Side length of the seed feature map the linear stem produces.
    pub fn seed_side(&self) -> usize {
        self.img_size / 4
    }
}

/// Maps latents `[N, d]` to reconstructions `[N, 1, H, W]` in `[0, 1]`.
///
/// Linear stem to a coarse feature map, two stride-2 transposed convolutions
/// back to full resolution, then a 1x1 projection with sigmoid output.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    stem: nn::Linear<B>,
    up1: ConvTranspose2d<B>,
    up2: ConvTranspose2d<B>,
    out: Conv2d<B>,
    seed_channels: usize,
    seed_side: usize,
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &DecoderConfig, device: &B::Device) -> Self {
        let [c0, c1, c2] = config.channels;
        let side = config.seed_side();

        let stem = nn::LinearConfig::new(config.latent_dim, c0 * side * side).init(device);
        let up1 = ConvTranspose2dConfig::new([c0, c1], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let up2 = ConvTranspose2dConfig::new([c1, c2], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let out = Conv2dConfig::new([c2, 1], [1, 1])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);

        Self {
            stem,
            up1,
            up2,
            out,
            seed_channels: c0,
            seed_side: side,
        }
    }

    /// Reconstructions `[N, 1, H, W]`.
    pub fn forward(&self, latents: Tensor<B, 2>) -> Tensor<B, 4> {
        let n = latents.dims()[0];
        let x = relu(self.stem.forward(latents));
        let x = x.reshape([n, self.seed_channels, self.seed_side, self.seed_side]);
        let x = relu(self.up1.forward(x));
        let x = relu(self.up2.forward(x));
        sigmoid(self.out.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use latro_core::{init_device, NdBackend};

    #[test]
    fn test_decoder_rejects_odd_size() {
        assert!(DecoderConfig::new(30, 6).is_err());
        assert!(DecoderConfig::new(28, 6).is_ok());
    }

    #[test]
    fn test_decoder_output_shape_and_range() {
        let device = init_device();
        let config = DecoderConfig::new(28, 6).unwrap();
        let decoder = Decoder::<NdBackend>::new(&config, &device);

        let z = Tensor::random([3, 6], Distribution::Normal(0.0, 1.0), &device);
        let images = decoder.forward(z);
        assert_eq!(images.dims(), [3, 1, 28, 28]);

        let data: Vec<f32> = images.into_data().to_vec().unwrap();
        assert!(data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_encoder_decoder_compose() {
        use crate::encoder::{Encoder, EncoderConfig};

        let device = init_device();
        let enc = Encoder::<NdBackend>::new(&EncoderConfig::new(28, 6), &device);
        let dec = Decoder::<NdBackend>::new(&DecoderConfig::new(28, 6).unwrap(), &device);

        let images = Tensor::random([2, 1, 28, 28], Distribution::Uniform(0.0, 1.0), &device);
        let recon = dec.forward(enc.forward(images));
        assert_eq!(recon.dims(), [2, 1, 28, 28]);
    }
}
