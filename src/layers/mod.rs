//! Layer primitives the generator is assembled from.
//!
//! This module contains the activation functions, the "same"-padded strided
//! convolutions and the per-call batch normalization.

pub mod activation;
pub mod conv;
pub mod norm;

pub use activation::{Activation, LEAKY_RELU_SLOPE};
pub use conv::{SameConv2d, SameConvTranspose2d, SamePadding, kernel_to_engine_layout};
pub use norm::{BATCH_NORM_EPSILON, SpatialBatchNorm};
