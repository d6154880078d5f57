//! A one-hidden-layer perceptron for MNIST digits, trained from scratch.
//!
//! `mnist-mlp` implements the whole training and inference engine by hand:
//! ReLU hidden layer, softmax output, cross-entropy loss, hand-derived
//! backpropagation and plain mini-batch gradient descent. Trained parameters
//! are written to a small JSON file that a separate inference process loads to
//! reproduce the same predictions.
//!
//! # Design goals
//!
//! - One forward pass: training, accuracy checks and standalone inference all
//!   go through [`Mlp::forward`] / [`Mlp::predict_with`].
//! - Predictable performance: reuse buffers ([`ForwardCache`] / [`Gradients`] /
//!   [`TrainBuffers`]) instead of allocating per sample.
//! - Clear contracts: shapes are validated at the API boundary and reported as
//!   [`Error::InvalidShape`]; the model is never left half-updated.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - [`Dataset`] stores samples contiguously in row-major layout, targets
//!   one-hot encoded.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - On disk the weights are nested arrays `W1`, `b1`, `W2`, `b2` (see
//!   [`model_io`]).
//!
//! # Quick start
//!
//! ```rust
//! use mnist_mlp::{Dataset, FitConfig, Mlp, Shuffle};
//!
//! # fn main() -> mnist_mlp::Result<()> {
//! let xs = vec![
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![0.9, 0.2],
//!     vec![0.1, 0.8],
//! ];
//! let ys = vec![
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//! ];
//! let train = Dataset::from_rows(&xs, &ys)?;
//!
//! let mut mlp = Mlp::new_with_seed(2, 8, 2, 0)?;
//! let report = mlp.fit(
//!     &train,
//!     None,
//!     &FitConfig {
//!         epochs: 5,
//!         lr: 0.5,
//!         batch_size: 2,
//!         shuffle: Shuffle::Seeded(0),
//!         train_eval_subset: 4,
//!     },
//! )?;
//! assert_eq!(report.epochs.len(), 5);
//!
//! let digit = mlp.predict(&[1.0, 0.0])?;
//! assert!(digit < 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Custom training loops
//!
//! Allocate buffers once and reuse them across steps:
//!
//! ```rust
//! use mnist_mlp::Mlp;
//!
//! # fn main() -> mnist_mlp::Result<()> {
//! let mut mlp = Mlp::new_with_seed(3, 8, 2, 0)?;
//! let mut cache = mlp.forward_cache();
//! let mut grads = mlp.gradients();
//!
//! let x = [0.1, 0.2, 0.3];
//! let y = [0.0, 1.0];
//!
//! mlp.forward(&x, &mut cache)?;
//! mlp.backward(&x, &cache, &y, &mut grads)?;
//! mlp.sgd_step(&grads, 1e-2);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod data;
pub mod error;
pub mod idx;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod mlp;
pub mod model_io;
pub mod pixels;
pub mod predict;
pub mod train;

pub use data::Dataset;
pub use error::{Error, Result};
pub use layer::Layer;
pub use metrics::{accuracy, accuracy_head};
pub use mlp::{ForwardCache, Gradients, Mlp};
pub use model_io::SerializedMlp;
pub use predict::{argmax, class_of};
pub use train::{CancelToken, EpochReport, FitConfig, FitReport, Shuffle, TrainBuffers};

/// Pixels per MNIST image (28 x 28).
pub const INPUT_DIM: usize = idx::WIDTH * idx::HEIGHT;
/// Hidden units used by the reference MNIST configuration.
pub const HIDDEN_DIM: usize = 512;
/// Digit classes.
pub const OUTPUT_DIM: usize = idx::NUM_CLASSES;

/// Shape-checked single-sample inference.
///
/// Thin wrapper around [`Mlp::predict_with`].
pub fn predict_with(mlp: &Mlp, input: &[f64], cache: &mut ForwardCache) -> Result<usize> {
    mlp.predict_with(input, cache)
}
