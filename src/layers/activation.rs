//! Activation functions used by the generator stages.

use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

/// Negative slope of the leaky ReLU that precedes every encoder convolution
/// after the first.
pub const LEAKY_RELU_SLOPE: f64 = 0.2;

/// Supported activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// No activation (identity function).
    #[default]
    None,
    /// Rectified Linear Unit: f(x) = max(0, x)
    Relu,
    /// Leaky ReLU: f(x) = x for x >= 0, else 0.2 * x
    LeakyRelu,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
}

impl Activation {
    /// Applies the activation function to a tensor.
    pub fn apply<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::None => tensor,
            Activation::Relu => burn::tensor::activation::relu(tensor),
            Activation::LeakyRelu => {
                burn::tensor::activation::leaky_relu(tensor, LEAKY_RELU_SLOPE)
            }
            Activation::Tanh => burn::tensor::activation::tanh(tensor),
        }
    }

    /// Returns the lowercase name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::None => "none",
            Activation::Relu => "relu",
            Activation::LeakyRelu => "leaky_relu",
            Activation::Tanh => "tanh",
        }
    }
}
