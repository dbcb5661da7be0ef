//! Image buffers in and out of NCHW tensors.

use std::io::Cursor;

use burn::tensor::{Tensor, TensorData, backend::Backend};
use image::{ImageFormat, Rgba, RgbImage, RgbaImage};

use crate::errors::ModelError;
use crate::graph::IMAGE_CHANNELS;

/// Builds a `[1, 3, H, W]` tensor with channel values divided by 255.
pub fn image_to_tensor<B: Backend>(image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let values: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();

    Tensor::<B, 1>::from_data(TensorData::new(values, [height * width * IMAGE_CHANNELS]), device)
        .div_scalar(255.0)
        .reshape([height, width, IMAGE_CHANNELS])
        .permute([2, 0, 1])
        .unsqueeze::<4>()
}

/// Maps a channel value in [0, 1] to a byte.
///
/// The scale is 256, not 255: anything at or above 255/256 lands on 255 and
/// the rest is floored. Out-of-range values saturate and NaN becomes 0.
pub fn quantize(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (256.0 * value).floor().clamp(0.0, 255.0) as u8
}

/// Reads a `[N, 3, H, W]` tensor in [0, 1] back into an opaque RGBA image.
///
/// Only the first item of the batch is read.
pub fn tensor_to_image<B: Backend>(tensor: Tensor<B, 4>) -> Result<RgbaImage, ModelError> {
    let [_, channels, height, width] = tensor.dims();
    if channels != IMAGE_CHANNELS {
        return Err(ModelError::InputChannels { actual: channels });
    }

    let pixels: Vec<f32> = tensor
        .narrow(0, 0, 1)
        .reshape([IMAGE_CHANNELS, height, width])
        .permute([1, 2, 0])
        .into_data()
        .to_vec()
        .map_err(|err| ModelError::Readback {
            message: format!("{:?}", err),
        })?;

    let mut image = RgbaImage::new(width as u32, height as u32);
    for (pixel, rgb) in image.pixels_mut().zip(pixels.chunks_exact(IMAGE_CHANNELS)) {
        *pixel = Rgba([quantize(rgb[0]), quantize(rgb[1]), quantize(rgb[2]), 255]);
    }
    Ok(image)
}

/// Encodes an image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ModelError> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::Rgb;

    type TestBackend = NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(254.5 / 256.0), 254);
        assert_eq!(quantize(255.0 / 256.0), 255);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(1.7), 255);
        assert_eq!(quantize(-0.2), 0);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_image_to_tensor_layout() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 51]));
        image.put_pixel(1, 0, Rgb([0, 102, 0]));

        let tensor = image_to_tensor::<TestBackend>(&image, &device());
        assert_eq!(tensor.dims(), [1, 3, 1, 2]);

        let values: Vec<f32> = tensor.to_data().to_vec().unwrap();
        let expected = [1.0, 0.0, 0.0, 0.4, 0.2, 0.0];
        for (e, v) in expected.iter().zip(values.iter()) {
            assert!((e - v).abs() < 1e-6, "{} != {}", e, v);
        }
    }

    #[test]
    fn test_tensor_to_image_sets_opaque_alpha() {
        // Planar [r0, r1, g0, g1, b0, b1].
        let tensor = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0, 0.5, 0.25, 0.0, 0.999], &device())
            .reshape([1, 3, 1, 2]);

        let image = tensor_to_image(tensor).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 128, 0, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([0, 64, 255, 255]));
    }

    #[test]
    fn test_tensor_to_image_rejects_wrong_channels() {
        let tensor = Tensor::<TestBackend, 4>::zeros([1, 4, 2, 2], &device());
        assert!(matches!(
            tensor_to_image(tensor),
            Err(ModelError::InputChannels { actual: 4 })
        ));
    }

    #[test]
    fn test_encode_png_signature() {
        let image = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }
}
