//! The generator graph: stage table, activation arena and the network itself.
//!
//! # Example
//!
//! ```
//! use pix2pix::graph::{GENERATOR_STAGES, SIZE_MULTIPLE, required_weight_names};
//!
//! assert_eq!(GENERATOR_STAGES.len(), 18);
//! assert_eq!(SIZE_MULTIPLE, 512);
//! assert!(required_weight_names().contains(&"generator/decoder_1/conv2d_transpose/kernel".to_string()));
//! ```

mod arena;
mod generator;
mod topology;

pub use arena::{ActivationArena, ArenaStats};
pub use generator::Generator;
#[cfg(test)]
pub(crate) use generator::tests::pointwise_weights;
pub use topology::{
    ConvKind, DEPTH, GENERATOR_STAGES, IMAGE_CHANNELS, Param, SIZE_MULTIPLE, STAGE_COUNT, STRIDE,
    StageInput, StageKind, StageSpec, WeightKey, decoder_layer_index, encoder_layer_index,
    required_weight_names,
};
