//! Conversions between pixels and network tensors.

pub mod codec;
pub mod process;

pub use codec::{encode_png, image_to_tensor, quantize, tensor_to_image};
pub use process::{deprocess, preprocess};
