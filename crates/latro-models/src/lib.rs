//! # latro-models
//!
//! The pre-trained collaborators of the evaluation: encoder and decoder
//! networks, the transport-operator layer over its learned dictionary, and
//! the checkpoint bundle that ties them together.
//!
//! These are pure burn modules plus an f64 transport path; the metric crates
//! drive them but never reach into their internals.
//!
//! ```rust,ignore
//! use latro_core::{init_device, EvalConfig};
//! use latro_models::ModelBundle;
//!
//! let device = init_device();
//! let bundle = ModelBundle::load("checkpoints/rot_digits", &device)?;
//! let z_mu = bundle.encoder.forward(images);
//! ```

pub mod checkpoint;
pub mod decoder;
pub mod encoder;
pub mod transport;

pub use checkpoint::*;
pub use decoder::*;
pub use encoder::*;
pub use transport::*;
