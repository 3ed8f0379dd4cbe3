//! Handwritten text recognition: a CNN-BiLSTM network with CTC decoding,
//! built on burn.
//!
//! The crate wires a four-stage convolutional feature extractor (pooling
//! strides factorized from the feature width by [`model::pool_strides`]) into
//! a bidirectional LSTM and a per-timestep dense head, and trains it against
//! a CTC objective with checkpoint resume, early stopping and per-epoch
//! metric logging under the paths derived by [`environment::Environment`].
//! Feature extraction and dataset generation live outside this crate; see
//! [`data::DataSource`] and [`data::LineItem`] for the seam.

pub mod data;
pub mod environment;
pub mod model;

pub use data::DataSource;
pub use environment::Environment;
pub use model::{HtrModel, HtrModelConfig, HtrNetwork, pool_strides};
