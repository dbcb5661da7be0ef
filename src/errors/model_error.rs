//! Model-related error types.

use thiserror::Error;

use super::LoadError;
use crate::model::ModelState;

/// The weight set does not fit the fixed generator topology.
///
/// Raised while the generator is being built, before any activation exists.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Missing weight: {name}")]
    MissingWeight { name: String },

    #[error("Weight {name} has rank {actual}, expected {expected}")]
    WeightRank {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Weight {name} has shape {actual:?}, expected {expected:?}")]
    WeightShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Stage {scope} expects {expected} input channels, topology provides {actual}")]
    ChannelMismatch {
        scope: String,
        expected: usize,
        actual: usize,
    },

    #[error("Generator produces {actual} output channels, expected 3")]
    OutputChannels { actual: usize },

    #[error("No activation recorded at layer index {index}")]
    MissingActivation { index: usize },
}

/// Errors that can occur during model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Model integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Shape mismatch: {height}x{width} is not a multiple of {multiple} in both dimensions")]
    ShapeMismatch {
        height: usize,
        width: usize,
        multiple: usize,
    },

    #[error("Input has {actual} channels, expected 3")]
    InputChannels { actual: usize },

    #[error("Another inference is already running on this model")]
    InferenceInProgress,

    #[error("Model is not ready (state: {state})")]
    NotReady { state: ModelState },

    #[error("Model was already loaded (state: {state})")]
    AlreadyLoaded { state: ModelState },

    #[error("Model failed to load: {message}")]
    LoadFailed { message: String },

    #[error("Failed to read back output tensor: {message}")]
    Readback { message: String },

    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),
}

impl ModelError {
    /// Returns true for errors caused by a weight set that does not fit the topology.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
