//! Affine maps between the image range [0, 1] and the network range [-1, 1].

use burn::tensor::{Tensor, backend::Backend};

/// Maps [0, 1] to [-1, 1].
pub fn preprocess<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.mul_scalar(2.0).sub_scalar(1.0)
}

/// Maps [-1, 1] back to [0, 1].
pub fn deprocess<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.add_scalar(1.0).div_scalar(2.0)
}
