//! Strided convolution and transposed convolution with "same" padding.
//!
//! Padding follows the TensorFlow convention the checkpoints were trained
//! with: the total padding is `max((out - 1) * stride + kernel - in, 0)`,
//! split with the smaller half before and the larger half after.

use burn::tensor::module::{conv_transpose2d, conv2d};
use burn::tensor::ops::{ConvOptions, ConvTransposeOptions};
use burn::tensor::{Tensor, backend::Backend};

/// How much zero padding goes on each side of one spatial axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamePadding {
    pub before: usize,
    pub after: usize,
}

impl SamePadding {
    /// Padding for a convolution reading `input` positions into `output` positions.
    pub fn for_output(input: usize, output: usize, kernel: usize, stride: usize) -> Self {
        let total = (output.saturating_sub(1) * stride + kernel).saturating_sub(input);
        let before = total / 2;
        Self {
            before,
            after: total - before,
        }
    }

    pub fn total(&self) -> usize {
        self.before + self.after
    }

    pub fn is_symmetric(&self) -> bool {
        self.before == self.after
    }
}

/// Output size of a "same" convolution.
pub fn same_output_size(input: usize, stride: usize) -> usize {
    input.div_ceil(stride)
}

/// Converts a checkpoint kernel to the engine layout.
///
/// Convolution kernels are stored `[kh, kw, in, out]` and transposed ones
/// `[kh, kw, out, in]`; the engine wants `[out, in, kh, kw]` and
/// `[in, out, kh, kw]` respectively, which is the same permutation.
pub fn kernel_to_engine_layout<B: Backend>(kernel: Tensor<B, 4>) -> Tensor<B, 4> {
    kernel.permute([3, 2, 0, 1])
}

/// Zero-pads one axis of an NCHW tensor.
fn pad_axis<B: Backend>(input: Tensor<B, 4>, axis: usize, padding: SamePadding) -> Tensor<B, 4> {
    if padding.total() == 0 {
        return input;
    }
    let device = input.device();
    let mut shape = input.dims();
    let mut parts = Vec::with_capacity(3);
    if padding.before > 0 {
        shape[axis] = padding.before;
        parts.push(Tensor::zeros(shape, &device));
    }
    parts.push(input);
    if padding.after > 0 {
        shape[axis] = padding.after;
        parts.push(Tensor::zeros(shape, &device));
    }
    Tensor::cat(parts, axis)
}

fn add_channel_bias<B: Backend>(input: Tensor<B, 4>, bias: Option<&Tensor<B, 1>>) -> Tensor<B, 4> {
    match bias {
        Some(bias) => {
            let [channels] = bias.dims();
            input + bias.clone().reshape([1, channels, 1, 1])
        }
        None => input,
    }
}

/// Strided convolution whose output is `ceil(input / stride)` on each axis.
#[derive(Debug, Clone)]
pub struct SameConv2d<B: Backend> {
    /// Engine layout `[out, in, kh, kw]`.
    kernel: Tensor<B, 4>,
    bias: Option<Tensor<B, 1>>,
    stride: usize,
}

impl<B: Backend> SameConv2d<B> {
    pub fn new(kernel: Tensor<B, 4>, bias: Option<Tensor<B, 1>>, stride: usize) -> Self {
        Self {
            kernel,
            bias,
            stride,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.kernel.dims()[1]
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.dims()[0]
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let [_, _, kernel_h, kernel_w] = self.kernel.dims();
        let rows = SamePadding::for_output(
            height,
            same_output_size(height, self.stride),
            kernel_h,
            self.stride,
        );
        let cols = SamePadding::for_output(
            width,
            same_output_size(width, self.stride),
            kernel_w,
            self.stride,
        );

        let (input, padding) = if rows.is_symmetric() && cols.is_symmetric() {
            (input, [rows.before, cols.before])
        } else {
            (pad_axis(pad_axis(input, 2, rows), 3, cols), [0, 0])
        };

        let options = ConvOptions::new([self.stride, self.stride], padding, [1, 1], 1);
        let output = conv2d(input, self.kernel.clone(), None, options);
        add_channel_bias(output, self.bias.as_ref())
    }
}

/// Transposed convolution whose output is exactly `input * stride` on each axis.
#[derive(Debug, Clone)]
pub struct SameConvTranspose2d<B: Backend> {
    /// Engine layout `[in, out, kh, kw]`.
    kernel: Tensor<B, 4>,
    bias: Option<Tensor<B, 1>>,
    stride: usize,
}

impl<B: Backend> SameConvTranspose2d<B> {
    pub fn new(kernel: Tensor<B, 4>, bias: Option<Tensor<B, 1>>, stride: usize) -> Self {
        Self {
            kernel,
            bias,
            stride,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.kernel.dims()[0]
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.dims()[1]
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let [_, _, kernel_h, kernel_w] = self.kernel.dims();
        let (out_h, out_w) = (height * self.stride, width * self.stride);

        let rows = SamePadding::for_output(out_h, height, kernel_h, self.stride);
        let cols = SamePadding::for_output(out_w, width, kernel_w, self.stride);

        // Size the engine produces when cropping `before` from both sides.
        let natural_h = ((height - 1) * self.stride + kernel_h) - 2 * rows.before;
        let natural_w = ((width - 1) * self.stride + kernel_w) - 2 * cols.before;

        let options = ConvTransposeOptions::new(
            [self.stride, self.stride],
            [rows.before, cols.before],
            [out_h.saturating_sub(natural_h), out_w.saturating_sub(natural_w)],
            [1, 1],
            1,
        );
        let mut output = conv_transpose2d(input, self.kernel.clone(), None, options);

        // An odd padding total leaves one surplus trailing row/column.
        let [_, _, got_h, got_w] = output.dims();
        if got_h > out_h {
            output = output.narrow(2, 0, out_h);
        }
        if got_w > out_w {
            output = output.narrow(3, 0, out_w);
        }

        add_channel_bias(output, self.bias.as_ref())
    }
}
