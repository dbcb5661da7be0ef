//! # pix2pix-rust
//!
//! Inference for pix2pix image-to-image translation models.
//!
//! A pretrained U-Net generator is loaded from a checkpoint, validated against
//! the fixed 9-level encoder/decoder topology and then run on RGB images whose
//! sides are multiples of 512. Each call returns a new image of the same size.
//!
//! ## Features
//!
//! - **Burn Backend**: Tensor math runs on Burn, WGPU for real work and
//!   NdArray for tests.
//! - **Checkpoint formats**: the compact quantized `.pict` container and a
//!   plain JSON snapshot of named tensors.
//! - **Async handle**: loading runs off the caller's task and publishes its
//!   state on a watch channel. At most one inference runs per handle.
//!
//! ## Example
//!
//! ```no_run
//! use pix2pix::prelude::*;
//!
//! # async fn run() -> Result<(), ModelError> {
//! let device = Default::default();
//! let model: ModelHandle<InferenceBackend> =
//!     ModelHandle::create("models/edges2pikachu.pict", ModelConfig::default(), device).await?;
//!
//! let sketch = image::open("sketch.png").map_err(ModelError::Encode)?;
//! let output = model.transfer(&sketch).await?;
//! std::fs::write("output.png", encode_png(&output)?).map_err(LoadError::from)?;
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod graph;
pub mod layers;
pub mod model;
pub mod pixels;

// Re-exports for convenience
pub use checkpoint::{CheckpointLoader, CheckpointSource, WeightSet, WeightTensor};
pub use config::ModelConfig;
pub use errors::{IntegrityError, LoadError, ModelError};
pub use graph::Generator;
pub use model::{ModelHandle, ModelState};

/// Backend type for inference.
pub type InferenceBackend = burn::backend::Wgpu;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::InferenceBackend;
    pub use crate::checkpoint::{
        CheckpointLoader, CheckpointSource, InMemoryCheckpoint, PictCheckpoint,
        SnapshotCheckpoint, WeightSet, WeightTensor,
    };
    pub use crate::config::{ConcurrencyPolicy, EncoderBias, ModelConfig, ReadinessPolicy};
    pub use crate::errors::{IntegrityError, LoadError, ModelError};
    pub use crate::graph::Generator;
    pub use crate::model::{ModelHandle, ModelState};
    pub use crate::pixels::encode_png;
}
