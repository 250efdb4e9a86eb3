//! Checkpoint bundle: networks + dictionary + the hyperparameters they were
//! trained with.
//!
//! Layout of a bundle directory:
//!
//! ```text
//! <dir>/encoder.bin       burn record (full precision)
//! <dir>/decoder.bin       burn record (full precision)
//! <dir>/psi.npy           dictionary [M, d, d], f64
//! <dir>/eval_config.json  EvalConfig snapshot
//! ```

use crate::decoder::{Decoder, DecoderConfig};
use crate::encoder::{Encoder, EncoderConfig};
use crate::transport::{OperatorDictionary, TransportOperator};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use latro_core::{EvalConfig, NdBackend};
use latro_samplers::RngKey;
use std::fs;
use std::path::Path;

type Device = <NdBackend as burn::tensor::backend::Backend>::Device;

/// Everything the evaluation needs from the training run.
pub struct ModelBundle {
    pub encoder: Encoder<NdBackend>,
    pub decoder: Decoder<NdBackend>,
    pub transport: TransportOperator,
    pub config: EvalConfig,
}

impl ModelBundle {
    /// A freshly initialized bundle (random weights, random small dictionary).
    ///
    /// Used when no checkpoint exists, so the pipeline stays runnable end to
    /// end; the metrics are then those of an untrained model.
    pub fn fresh(config: EvalConfig, key: RngKey, device: &Device) -> Result<Self, String> {
        config.validate()?;
        let encoder = Encoder::new(&EncoderConfig::new(config.img_size, config.latent_dim), device);
        let decoder = Decoder::new(&DecoderConfig::new(config.img_size, config.latent_dim)?, device);
        let dictionary =
            OperatorDictionary::random_init(key, config.n_operators, config.latent_dim);
        Ok(Self {
            encoder,
            decoder,
            transport: TransportOperator::new(dictionary),
            config,
        })
    }

    /// Save the bundle into `dir` (created if missing).
    pub fn save(&self, dir: &Path) -> Result<(), String> {
        fs::create_dir_all(dir).map_err(|e| format!("create {:?}: {e}", dir))?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.encoder
            .clone()
            .save_file(dir.join("encoder"), &recorder)
            .map_err(|e| format!("save encoder: {e}"))?;
        self.decoder
            .clone()
            .save_file(dir.join("decoder"), &recorder)
            .map_err(|e| format!("save decoder: {e}"))?;

        self.transport.dictionary().save_npy(&dir.join("psi.npy"))?;

        let config_json = serde_json::to_string_pretty(&self.config)
            .map_err(|e| format!("serialize config: {e}"))?;
        fs::write(dir.join("eval_config.json"), config_json)
            .map_err(|e| format!("write config: {e}"))?;

        Ok(())
    }

    /// Load a bundle from `dir`, validating the dictionary against the
    /// stored hyperparameters.
    pub fn load(dir: &Path, device: &Device) -> Result<Self, String> {
        let config_raw = fs::read_to_string(dir.join("eval_config.json"))
            .map_err(|e| format!("read {:?}: {e}", dir.join("eval_config.json")))?;
        let config: EvalConfig =
            serde_json::from_str(&config_raw).map_err(|e| format!("parse config: {e}"))?;
        config.validate()?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let encoder =
            Encoder::new(&EncoderConfig::new(config.img_size, config.latent_dim), device)
                .load_file(dir.join("encoder"), &recorder, device)
                .map_err(|e| format!("load encoder: {e}"))?;
        let decoder =
            Decoder::new(&DecoderConfig::new(config.img_size, config.latent_dim)?, device)
                .load_file(dir.join("decoder"), &recorder, device)
                .map_err(|e| format!("load decoder: {e}"))?;

        let dictionary = OperatorDictionary::load_npy(&dir.join("psi.npy"))?;
        if dictionary.latent_dim() != config.latent_dim {
            return Err(format!(
                "dictionary latent dim {} does not match config latent dim {}",
                dictionary.latent_dim(),
                config.latent_dim
            ));
        }
        if dictionary.len() != config.n_operators {
            return Err(format!(
                "dictionary has {} operators, config expects {}",
                dictionary.len(),
                config.n_operators
            ));
        }

        log::info!(
            "loaded bundle from {:?} (d={}, M={})",
            dir,
            config.latent_dim,
            config.n_operators
        );

        Ok(Self {
            encoder,
            decoder,
            transport: TransportOperator::new(dictionary),
            config,
        })
    }

    /// Load from `dir`, or fall back to a fresh bundle when the checkpoint is
    /// missing or unreadable.
    pub fn load_or_fresh(
        dir: &Path,
        config: EvalConfig,
        key: RngKey,
        device: &Device,
    ) -> Result<Self, String> {
        match Self::load(dir, device) {
            Ok(bundle) => Ok(bundle),
            Err(e) => {
                log::warn!("no usable checkpoint at {:?} ({e}); using fresh weights", dir);
                Self::fresh(config, key, device)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::latent_to_array;
    use burn::tensor::{Distribution, Tensor};
    use latro_core::init_device;

    fn small_config() -> EvalConfig {
        let mut config = EvalConfig::default();
        config.img_size = 16;
        config.latent_dim = 4;
        config.n_operators = 2;
        config
    }

    #[test]
    fn test_bundle_roundtrip_preserves_outputs() {
        let device = init_device();
        let bundle = ModelBundle::fresh(small_config(), RngKey::new(1), &device).unwrap();

        let dir = std::env::temp_dir().join("latro_test_bundle");
        bundle.save(&dir).unwrap();
        let loaded = ModelBundle::load(&dir, &device).unwrap();

        let images = Tensor::random([2, 1, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
        let a = latent_to_array(bundle.encoder.forward(images.clone()));
        let b = latent_to_array(loaded.encoder.forward(images));
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_or_fresh_falls_back() {
        let device = init_device();
        let missing = std::env::temp_dir().join("latro_no_such_checkpoint");
        let bundle =
            ModelBundle::load_or_fresh(&missing, small_config(), RngKey::new(2), &device).unwrap();
        assert_eq!(bundle.transport.dictionary().len(), 2);
    }
}
