//! # latro-metrics
//!
//! The evaluation metrics for the transport-operator autoencoder:
//!
//! - [`estimate_log_likelihood`]: per-image importance-sampled data
//!   log-likelihood on rotated digits
//! - [`evaluate_elbo`]: evidence lower bound and reconstruction MSE over
//!   held-out batches
//! - [`ProgressWriter`]: periodic progress checkpoints (`.npy` arrays plus a
//!   JSON sidecar) so long runs can be inspected and resumed mid-flight
//!
//! Both metrics share the same probabilistic skeleton. A latent sample z is
//! drawn by transporting the encoded mean with Laplace-distributed operator
//! coefficients plus Gaussian noise; its importance weight combines
//!
//! ```text
//! log p(x|z)   reconstruction, Gaussian with precision recon_weight
//! log q(z|x)   transport posterior around the inferred coefficient path
//! log p(z)     anchor prior: transports from encoded rotations of the digit
//! ```
//!
//! and the per-image estimate is `logsumexp_k(...) - ln k`.

pub mod density;
pub mod elbo;
pub mod likelihood;
pub mod progress;

pub use density::*;
pub use elbo::*;
pub use likelihood::*;
pub use progress::*;
