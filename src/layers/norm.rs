//! Batch normalization with statistics computed from the current input.

use burn::tensor::{Tensor, backend::Backend};

/// Variance epsilon the generator was trained with.
pub const BATCH_NORM_EPSILON: f64 = 1e-5;

/// Per-channel normalization over the spatial axes of an NCHW tensor.
///
/// Mean and (population) variance are taken over height and width of the
/// tensor being normalized; no running statistics are stored.
#[derive(Debug, Clone)]
pub struct SpatialBatchNorm<B: Backend> {
    gamma: Tensor<B, 1>,
    beta: Tensor<B, 1>,
    epsilon: f64,
}

impl<B: Backend> SpatialBatchNorm<B> {
    pub fn new(gamma: Tensor<B, 1>, beta: Tensor<B, 1>) -> Self {
        Self {
            gamma,
            beta,
            epsilon: BATCH_NORM_EPSILON,
        }
    }

    pub fn num_features(&self) -> usize {
        self.gamma.dims()[0]
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let channels = self.num_features();
        let mean = input.clone().mean_dim(3).mean_dim(2);
        let centered = input - mean;
        let variance = centered.clone().powf_scalar(2.0).mean_dim(3).mean_dim(2);
        let inv_std = variance.add_scalar(self.epsilon).sqrt().recip();

        let scale = self.gamma.clone().reshape([1, channels, 1, 1]);
        let offset = self.beta.clone().reshape([1, channels, 1, 1]);
        centered * inv_std * scale + offset
    }
}
