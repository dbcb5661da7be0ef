//! Model handle configuration.

use serde::{Deserialize, Serialize};

/// What `transfer` does when the model is not ready yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Return `ModelError::NotReady` right away.
    #[default]
    Reject,
    /// Wait until loading finishes.
    Wait,
}

/// What `transfer` does while another inference is running on the same handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Return `ModelError::InferenceInProgress`.
    #[default]
    Reject,
    /// Wait for the running call to finish.
    Queue,
}

/// Whether the encoder convolutions add their bias.
///
/// Checkpoints carry an encoder bias, but the reference generator never adds
/// it. `Skip` reproduces that output exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderBias {
    #[default]
    Skip,
    Apply,
}

/// Configuration for a [`ModelHandle`](crate::model::ModelHandle).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub readiness: ReadinessPolicy,
    pub concurrency: ConcurrencyPolicy,
    pub encoder_bias: EncoderBias,
    /// Side length of a white image transferred once right after loading.
    pub warm_up: Option<u32>,
}

impl ModelConfig {
    /// Creates a new ModelConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the readiness policy.
    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Sets the concurrency policy.
    pub fn concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency = policy;
        self
    }

    pub fn encoder_bias(mut self, encoder_bias: EncoderBias) -> Self {
        self.encoder_bias = encoder_bias;
        self
    }

    /// Sets the warm-up image size, `None` to disable.
    pub fn warm_up(mut self, size: Option<u32>) -> Self {
        self.warm_up = size;
        self
    }

    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
