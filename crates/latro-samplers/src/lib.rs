//! # latro-samplers
//!
//! Keyed sampling for the LATRO evaluation.
//!
//! - **RNG keys**: deterministic, splittable keys (similar to JAX):
//!
//! ```rust
//! use latro_samplers::RngKey;
//!
//! let key = RngKey::new(42);
//! let (key1, key2) = key.split_two();
//! ```
//!
//! - **Coefficient sampler**: i.i.d. Laplace draws for transport-operator
//!   coefficients via [`LaplaceSampler`]
//! - **Noise**: standard-normal latent noise via [`gaussian_noise`]

pub mod laplace;
pub mod rng;

pub use laplace::*;
pub use rng::*;
