//! Configuration for LATRO.
//!
//! Two layers live here:
//!
//! - [`PathConfig`]: where cache files, datasets, and evaluation outputs go.
//!   Paths can be configured via:
//!   1. CLI arguments (highest priority)
//!   2. Environment variables
//!   3. Config file (`~/.config/latro/config.toml`)
//!   4. Default system directories
//! - [`EvalConfig`]: the hyperparameters of the evaluation itself (latent
//!   dimension, operator count, importance-sample count, density weights).
//!   These mirror the settings the model was trained with and are stored
//!   alongside checkpoints.
//!
//! # Example
//!
//! ```ignore
//! use latro_core::config::{EvalConfig, PathConfig};
//!
//! let paths = PathConfig::builder()
//!     .output_dir("/scratch/latro/output")
//!     .build();
//! let progress = paths.output_dir().join("metrics_progress.npy");
//!
//! let eval = EvalConfig::default();
//! assert_eq!(eval.n_importance, 10);
//! ```

use clap::Parser;
use directories::ProjectDirs;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Global path configuration instance
static GLOBAL_CONFIG: OnceCell<PathConfig> = OnceCell::new();

/// CLI arguments for path configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "LATRO Path Configuration")]
pub struct PathArgs {
    /// Cache directory for intermediate files
    #[arg(long, env = "LATRO_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Data directory for digit datasets
    #[arg(long, env = "LATRO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output directory for metric arrays, progress files, and logs
    #[arg(long, env = "LATRO_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Base directory for all LATRO files (overrides individual paths)
    #[arg(long, env = "LATRO_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(long, env = "LATRO_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

/// Path configuration from config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfigFile {
    /// Cache directory
    pub cache_dir: Option<PathBuf>,
    /// Data directory
    pub data_dir: Option<PathBuf>,
    /// Output directory
    pub output_dir: Option<PathBuf>,
    /// Base directory (overrides individual paths if set)
    pub base_dir: Option<PathBuf>,
}

/// Complete path configuration for LATRO
#[derive(Debug, Clone)]
pub struct PathConfig {
    cache_dir: PathBuf,
    data_dir: PathBuf,
    output_dir: PathBuf,
}

impl PathConfig {
    /// Parse configuration from CLI arguments
    ///
    /// Priority order:
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Default directories
    pub fn from_args() -> Self {
        let args = PathArgs::parse();
        Self::from_path_args(args)
    }

    /// Parse configuration from CLI arguments (ignoring unknown args)
    ///
    /// Use this when mixing with other CLI parsers
    pub fn from_args_relaxed() -> Self {
        let args = PathArgs::try_parse().unwrap_or(PathArgs {
            cache_dir: None,
            data_dir: None,
            output_dir: None,
            base_dir: None,
            config_file: None,
        });
        Self::from_path_args(args)
    }

    /// Create configuration from PathArgs
    ///
    /// Use this when you have a flattened PathArgs in your own CLI parser.
    pub fn from_path_args(args: PathArgs) -> Self {
        let file_config = Self::load_config_file(args.config_file.as_deref());

        let base_dir = args
            .base_dir
            .or(file_config.base_dir.clone())
            .or_else(|| env::var("LATRO_BASE_DIR").ok().map(PathBuf::from));

        // Build paths with priority: CLI > env > file > defaults
        let defaults = Self::default_dirs();

        let cache_dir = args
            .cache_dir
            .or_else(|| base_dir.as_ref().map(|b| b.join("cache")))
            .or(file_config.cache_dir)
            .unwrap_or(defaults.0);

        let data_dir = args
            .data_dir
            .or_else(|| base_dir.as_ref().map(|b| b.join("data")))
            .or(file_config.data_dir)
            .unwrap_or(defaults.1);

        let output_dir = args
            .output_dir
            .or_else(|| base_dir.as_ref().map(|b| b.join("output")))
            .or(file_config.output_dir)
            .unwrap_or(defaults.2);

        PathConfig {
            cache_dir,
            data_dir,
            output_dir,
        }
    }

    /// Create a new builder for custom configuration
    pub fn builder() -> PathConfigBuilder {
        PathConfigBuilder::new()
    }

    /// Get the cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Ensure all directories exist, creating them if necessary
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Get the global configuration instance
    ///
    /// Initializes with defaults on first call. Use `set_global` to customize.
    pub fn global() -> &'static PathConfig {
        GLOBAL_CONFIG.get_or_init(PathConfig::from_args_relaxed)
    }

    /// Set the global configuration
    ///
    /// Returns Err if already initialized
    pub fn set_global(config: PathConfig) -> Result<(), PathConfig> {
        GLOBAL_CONFIG.set(config)
    }

    /// Get default directories based on OS conventions
    fn default_dirs() -> (PathBuf, PathBuf, PathBuf) {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "latro") {
            (
                proj_dirs.cache_dir().to_path_buf(),
                proj_dirs.data_dir().to_path_buf(),
                proj_dirs.data_dir().join("output"),
            )
        } else {
            // Fallback to current directory
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            (
                cwd.join(".latro/cache"),
                cwd.join(".latro/data"),
                cwd.join("output"),
            )
        }
    }

    /// Load config file from path or default location
    fn load_config_file(path: Option<&Path>) -> PathConfigFile {
        let config_path = path.map(PathBuf::from).or_else(|| {
            ProjectDirs::from("", "", "latro").map(|dirs| dirs.config_dir().join("config.toml"))
        });

        if let Some(path) = config_path {
            if path.exists() {
                if let Ok(contents) = fs::read_to_string(&path) {
                    if let Ok(config) = toml::from_str::<PathConfigFile>(&contents) {
                        return config;
                    }
                }
            }
        }

        PathConfigFile::default()
    }

    /// Save current configuration to a file
    pub fn save_to_file(&self, path: &Path) -> std::io::Result<()> {
        let config = PathConfigFile {
            cache_dir: Some(self.cache_dir.clone()),
            data_dir: Some(self.data_dir.clone()),
            output_dir: Some(self.output_dir.clone()),
            base_dir: None,
        };

        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, toml_str)
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        let (cache, data, output) = Self::default_dirs();
        PathConfig {
            cache_dir: cache,
            data_dir: data,
            output_dir: output,
        }
    }
}

/// Builder for PathConfig
#[derive(Debug, Clone, Default)]
pub struct PathConfigBuilder {
    cache_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    base_dir: Option<PathBuf>,
}

impl PathConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cache directory
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Set data directory
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Set output directory
    pub fn output_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set base directory (will create cache/data/output subdirectories)
    pub fn base_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_dir = Some(path.into());
        self
    }

    /// Build the PathConfig
    pub fn build(self) -> PathConfig {
        let defaults = PathConfig::default_dirs();

        let (cache_default, data_default, output_default) = if let Some(base) = &self.base_dir {
            (base.join("cache"), base.join("data"), base.join("output"))
        } else {
            defaults
        };

        PathConfig {
            cache_dir: self.cache_dir.unwrap_or(cache_default),
            data_dir: self.data_dir.unwrap_or(data_default),
            output_dir: self.output_dir.unwrap_or(output_default),
        }
    }
}

/// Hyperparameters of the evaluation.
///
/// These mirror the settings the model was trained with. The density weights
/// enter the likelihood and ELBO terms directly:
///
/// ```text
/// log p(x|z) = -0.5 * recon_weight * ||decode(z) - x||^2   (+ constant)
/// log q(z|x) = -0.5 / noise_std^2 * ||scale*(z - ẑ_mu)||^2
///              - post_l1_weight * ||ĉ||_1                  (+ constant)
/// ```
///
/// `scale` divides latent vectors before coefficient inference so the solver
/// operates in a well-conditioned range; every latent distance is multiplied
/// back by `scale` before entering a density.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "LATRO evaluation hyperparameters")]
pub struct EvalConfig {
    /// Image side length (images are img_size x img_size, single channel)
    #[arg(long, default_value = "28", env = "LATRO_IMG_SIZE")]
    pub img_size: usize,

    /// Latent dimension d
    #[arg(long, default_value = "6", env = "LATRO_LATENT_DIM")]
    pub latent_dim: usize,

    /// Number of transport operator dictionary elements M
    #[arg(long, default_value = "4", env = "LATRO_N_OPERATORS")]
    pub n_operators: usize,

    /// Number of anchors per image (evenly spaced rotations)
    #[arg(long, default_value = "4", env = "LATRO_N_ANCHORS")]
    pub n_anchors: usize,

    /// Number of restarts for prior coefficient inference
    #[arg(long, default_value = "2", env = "LATRO_N_RESTARTS")]
    pub n_restarts: usize,

    /// Importance samples per image for the log-likelihood estimate
    #[arg(long, short = 'k', default_value = "10", env = "LATRO_N_IMPORTANCE")]
    pub n_importance: usize,

    /// Latent scaling applied before coefficient inference
    #[arg(long, default_value = "30.0")]
    pub scale: f64,

    /// Transport sampling noise standard deviation
    #[arg(long, default_value = "0.01")]
    pub noise_std: f64,

    /// Reconstruction precision (inverse variance of p(x|z))
    #[arg(long, default_value = "1.0")]
    pub recon_weight: f64,

    /// Posterior L1 weight (Laplace rate of the coefficient distribution)
    #[arg(long, default_value = "1.0")]
    pub post_l1_weight: f64,

    /// L1 weight used when inferring posterior coefficients
    #[arg(long, default_value = "0.01")]
    pub post_coef_weight: f64,

    /// L1 weight used when inferring prior (anchor) coefficients
    #[arg(long, default_value = "0.01")]
    pub prior_coef_weight: f64,

    /// Posterior transport weight in the ELBO
    #[arg(long, default_value = "1.0")]
    pub post_to_weight: f64,

    /// Prior transport weight
    #[arg(long, default_value = "1.0")]
    pub prior_weight: f64,

    /// Prior L1 weight
    #[arg(long, default_value = "1.0")]
    pub prior_l1_weight: f64,

    /// Use only the closest anchor (by inference energy) in the prior instead
    /// of averaging over all anchors
    #[arg(long)]
    pub closest_anchor: bool,

    /// Batch size for held-out ELBO/MSE evaluation
    #[arg(long, default_value = "50")]
    pub eval_batch: usize,

    /// Random seed
    #[arg(long, short = 's', default_value = "42", env = "LATRO_SEED")]
    pub seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        // clap's defaults are the single source of truth
        EvalConfig::parse_from(["latro"])
    }
}

impl EvalConfig {
    /// Flattened image dimensionality D = H * W (single channel).
    pub fn data_dim(&self) -> usize {
        self.img_size * self.img_size
    }

    /// Laplace scale b = 1 / post_l1_weight of the coefficient distribution.
    pub fn laplace_scale(&self) -> f64 {
        1.0 / self.post_l1_weight
    }

    /// Basic sanity checks; call after parsing user input.
    pub fn validate(&self) -> Result<(), String> {
        if self.img_size == 0 || self.latent_dim == 0 || self.n_operators == 0 {
            return Err("img_size, latent_dim, and n_operators must be positive".into());
        }
        if self.n_anchors == 0 {
            return Err("n_anchors must be positive".into());
        }
        if self.n_importance == 0 {
            return Err("n_importance must be positive".into());
        }
        if self.noise_std <= 0.0 {
            return Err(format!("noise_std must be positive, got {}", self.noise_std));
        }
        if self.post_l1_weight <= 0.0 || self.recon_weight <= 0.0 {
            return Err("density weights must be positive".into());
        }
        if self.scale == 0.0 {
            return Err("scale must be nonzero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PathConfig::default();
        assert!(!config.cache_dir().as_os_str().is_empty());
        assert!(!config.data_dir().as_os_str().is_empty());
        assert!(!config.output_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_builder() {
        let config = PathConfig::builder()
            .cache_dir("/tmp/test/cache")
            .data_dir("/tmp/test/data")
            .output_dir("/tmp/test/output")
            .build();

        assert_eq!(config.cache_dir(), Path::new("/tmp/test/cache"));
        assert_eq!(config.data_dir(), Path::new("/tmp/test/data"));
        assert_eq!(config.output_dir(), Path::new("/tmp/test/output"));
    }

    #[test]
    fn test_base_dir_builder() {
        let config = PathConfig::builder().base_dir("/scratch/latro").build();

        assert_eq!(config.cache_dir(), Path::new("/scratch/latro/cache"));
        assert_eq!(config.data_dir(), Path::new("/scratch/latro/data"));
        assert_eq!(config.output_dir(), Path::new("/scratch/latro/output"));
    }

    #[test]
    fn test_eval_config_defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.img_size, 28);
        assert_eq!(config.n_importance, 10);
        assert_eq!(config.data_dim(), 784);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_eval_config_validate_rejects_zero_noise() {
        let mut config = EvalConfig::default();
        config.noise_std = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_laplace_scale() {
        let mut config = EvalConfig::default();
        config.post_l1_weight = 4.0;
        assert!((config.laplace_scale() - 0.25).abs() < 1e-12);
    }
}
