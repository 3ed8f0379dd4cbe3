pub mod blocks;
pub mod ctc;
pub mod htr;
pub mod inference;
pub mod network;
pub mod stride;
pub mod training;

pub use htr::{HtrModel, HtrModelConfig};
pub use network::{DecoderConfig, HtrNetwork};
pub use stride::pool_strides;
