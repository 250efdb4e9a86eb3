//! # latro-core
//!
//! Core types for the LATRO evaluation stack.
//!
//! This crate provides the foundations shared by every other LATRO crate:
//!
//! - [`backend`]: the CPU tensor backend alias used throughout the workspace
//! - [`config`]: path configuration (cache/data/output) and the evaluation
//!   hyperparameter set [`EvalConfig`]
//! - [`rotate`]: the rotated-digit image transform (arbitrary-angle bilinear
//!   rotation, anchor angle grids, random test rotations)
//! - [`data`]: `.npy`-backed digit batches and their tensor conversions
//!
//! ```rust,ignore
//! use latro_core::{init_device, EvalConfig, DigitBatch};
//!
//! let device = init_device();
//! let config = EvalConfig::default();
//! let batch = DigitBatch::load("digits.npy", "labels.npy")?;
//! let images = batch.images_tensor(&device);
//! ```

pub mod backend;
pub mod config;
pub mod data;
pub mod rotate;

pub use backend::*;
pub use config::*;
pub use data::*;
pub use rotate::*;
