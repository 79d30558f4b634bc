//! Frame type: decoded camera or snapshot image handed to the recognition oracle.

use chrono::{DateTime, Local};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Pixel layout of [`Frame::data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 8-bit grayscale, one byte per pixel.
    Gray8,
    /// Packed 8-bit RGB, three bytes per pixel.
    Rgb8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb8 => 3,
        }
    }
}

/// A single decoded image.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub captured_at: DateTime<Local>,
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("image encode failed: {0}")]
    Encode(String),
}

impl Frame {
    /// Wrap a raw pixel buffer, checking it matches the stated dimensions.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
            captured_at: Local::now(),
            sequence: 0,
        })
    }

    /// Decode an encoded image (JPEG, PNG, ...) such as a user-submitted snapshot.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, FrameError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| FrameError::Decode(e.to_string()))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, PixelLayout::Rgb8)
    }

    /// Encode as JPEG for transport to the recognition oracle.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, FrameError> {
        let image = self.to_dynamic()?;
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Jpeg)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }

    fn to_dynamic(&self) -> Result<DynamicImage, FrameError> {
        let invalid = || FrameError::InvalidLength {
            expected: self.width as usize * self.height as usize * self.layout.bytes_per_pixel(),
            actual: self.data.len(),
        };
        match self.layout {
            PixelLayout::Gray8 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(invalid),
            PixelLayout::Rgb8 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid),
        }
    }

    /// Average luminance (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let luma = self.luma();
        if luma.is_empty() {
            return 0.0;
        }
        luma.iter().map(|&b| b as f32).sum::<f32>() / luma.len() as f32
    }

    /// True if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        is_dark_frame(&self.luma(), threshold_pct)
    }

    fn luma(&self) -> Vec<u8> {
        match self.layout {
            PixelLayout::Gray8 => self.data.clone(),
            PixelLayout::Rgb8 => self
                .data
                .chunks_exact(3)
                .map(|px| {
                    let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                    y.round().clamp(0.0, 255.0) as u8
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

/// Check if a grayscale buffer is dark: share of pixels below 32 exceeds `threshold_pct`.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = Frame::new(vec![0; 5], 2, 2, PixelLayout::Rgb8);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 12, actual: 5 })
        ));
    }

    #[test]
    fn test_jpeg_encode_decode() {
        let frame = Frame::new(vec![128u8; 16 * 16], 16, 16, PixelLayout::Gray8).unwrap();
        let jpeg = frame.to_jpeg().unwrap();
        assert!(jpeg.starts_with(&[0xFF, 0xD8]));

        let decoded = Frame::from_encoded(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 16));
        assert_eq!(decoded.layout, PixelLayout::Rgb8);
        assert!((decoded.avg_brightness() - 128.0).abs() < 4.0);
    }

    #[test]
    fn test_from_encoded_garbage() {
        assert!(matches!(
            Frame::from_encoded(b"definitely not an image"),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → should NOT be dark
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&gray, 0.95));
    }

    #[test]
    fn test_rgb_frame_dark_detection() {
        let frame = Frame::new(vec![5u8; 4 * 4 * 3], 4, 4, PixelLayout::Rgb8).unwrap();
        assert!(frame.is_dark(0.95));
        assert!(frame.avg_brightness() < 6.0);
    }
}
