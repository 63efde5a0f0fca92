use image::{ColorType, DynamicImage, RgbImage, RgbaImage};

use crate::error::{NodeError, NodeResult};

/// Side length of the blank image the folder selector returns on failure.
pub const SELECTOR_SENTINEL_SIZE: u32 = 512;

/// Side length of the placeholder the metadata tool bridge returns when it
/// cannot run.
pub const BRIDGE_PLACEHOLDER_SIZE: u32 = 64;

/// A decoded bitmap stored row-major as `height x width x channels` floats in
/// `[0, 1]`. Only RGB (3) and RGBA (4) layouts exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<f32>,
}

impl ImageBuffer {
    /// All-black RGB image.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 3,
            data: vec![0.0; width as usize * height as usize * 3],
        }
    }

    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<f32>) -> NodeResult<Self> {
        if !matches!(channels, 3 | 4) {
            return Err(NodeError::invalid_input(format!(
                "unsupported channel count {channels} (expected 3 or 4)"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(NodeError::invalid_input(format!(
                "image buffer holds {} values, expected {expected} for {width}x{height}x{channels}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Normalise a decoded image. RGBA sources keep their alpha channel;
    /// every other colour type is converted to RGB.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        match image.color() {
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => Self {
                width,
                height,
                channels: 4,
                data: image.to_rgba32f().into_raw(),
            },
            _ => Self {
                width,
                height,
                channels: 3,
                data: image.to_rgb32f().into_raw(),
            },
        }
    }

    /// Quantise back to 8 bits per channel.
    pub fn to_dynamic(&self) -> DynamicImage {
        let bytes = self.data.iter().copied().map(quantize).collect::<Vec<u8>>();
        if self.channels == 4 {
            RgbaImage::from_raw(self.width, self.height, bytes)
                .map(DynamicImage::ImageRgba8)
                .unwrap_or_else(|| DynamicImage::new_rgba8(self.width, self.height))
        } else {
            RgbImage::from_raw(self.width, self.height, bytes)
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(self.width, self.height))
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// `(height, width, channels)`, the order the host uses.
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.height, self.width, self.channels)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[f32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let stride = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * stride;
        self.data.get(start..start + stride)
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|v| *v == 0.0)
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, Rgba};

    #[test]
    fn blank_is_black_rgb_with_expected_shape() {
        let blank = ImageBuffer::blank(SELECTOR_SENTINEL_SIZE, SELECTOR_SENTINEL_SIZE);
        assert_eq!(blank.shape(), (512, 512, 3));
        assert!(blank.is_blank());
    }

    #[test]
    fn rgba_sources_keep_alpha() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 128]));
        let buffer = ImageBuffer::from_dynamic(&DynamicImage::ImageRgba8(img));
        assert_eq!(buffer.shape(), (1, 2, 4));
        let px = buffer.pixel(1, 0).expect("pixel should exist");
        assert!((px[0] - 1.0).abs() < 1e-6);
        assert!((px[3] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn grayscale_sources_become_rgb() {
        let img = GrayImage::from_pixel(3, 2, Luma([51]));
        let buffer = ImageBuffer::from_dynamic(&DynamicImage::ImageLuma8(img));
        assert_eq!(buffer.shape(), (2, 3, 3));
        let px = buffer.pixel(0, 0).expect("pixel should exist");
        assert!(px.iter().all(|v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn quantization_round_trips_eight_bit_values() {
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([x as u8 * 16, y as u8 * 16, 127]));
        let source = DynamicImage::ImageRgb8(img);
        let back = ImageBuffer::from_dynamic(&source).to_dynamic();
        assert_eq!(back.to_rgb8().into_raw(), source.to_rgb8().into_raw());
    }

    #[test]
    fn from_raw_rejects_mismatched_length() {
        let err = ImageBuffer::from_raw(2, 2, 3, vec![0.0; 5]).expect_err("length should mismatch");
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
        let err = ImageBuffer::from_raw(1, 1, 2, vec![0.0; 2]).expect_err("channels should fail");
        assert!(err.message.contains("channel count"));
    }

    #[test]
    fn values_outside_unit_range_are_clamped() {
        assert_eq!(quantize(-0.5), 0);
        assert_eq!(quantize(2.0), 255);
        assert_eq!(quantize(0.5), 128);
    }
}
