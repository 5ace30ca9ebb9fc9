use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageError, ImageFormat, ImageReader, Limits};
use log::debug;

use super::is_accepted;
use crate::error::AnalysisFailure;
use crate::models::NormalizedImage;

const JPEG_QUALITY: u8 = 85;
pub const DEFAULT_MAX_PIXELS: u64 = 150_000_000;
// Worst accepted layout is 16-bit RGBA.
const MAX_BYTES_PER_PIXEL: u64 = 8;

/// Scales oversized charts down to the configured longest edge.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    dimension_cap: u32,
    max_pixels: u64,
}

impl ImageNormalizer {
    pub fn new(dimension_cap: u32) -> Self {
        Self {
            dimension_cap: dimension_cap.max(1),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    /// Decode budget: images with more pixels than this are refused before decoding.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels.max(1);
        self
    }

    pub fn dimension_cap(&self) -> u32 {
        self.dimension_cap
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_pixels.saturating_mul(MAX_BYTES_PER_PIXEL));
        limits
    }

    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedImage, AnalysisFailure> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| AnalysisFailure::decode(format!("Unable to read image: {}", e)))?;
        let source_format = reader
            .format()
            .ok_or_else(|| AnalysisFailure::decode("Unrecognized image format"))?;

        let (header_w, header_h) = ImageReader::with_format(Cursor::new(bytes), source_format)
            .into_dimensions()
            .map_err(decode_failure)?;
        let pixels = header_w as u64 * header_h as u64;
        if pixels > self.max_pixels {
            return Err(AnalysisFailure::invalid_input(format!(
                "Image dimensions too large: {}x{} exceeds the {} pixel decode budget",
                header_w, header_h, self.max_pixels
            )));
        }

        reader.limits(self.limits());
        let image = reader.decode().map_err(decode_failure)?;

        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(AnalysisFailure::decode("Image has no pixels"));
        }

        if width.max(height) <= self.dimension_cap && is_accepted(source_format) {
            return Ok(NormalizedImage {
                bytes: bytes.to_vec(),
                width,
                height,
                format: source_format,
            });
        }

        let (target_w, target_h) = scaled_dimensions(width, height, self.dimension_cap);
        debug!(
            "Downscaling {}x{} {:?} to {}x{}",
            width, height, source_format, target_w, target_h
        );
        let resized = if (target_w, target_h) == (width, height) {
            image
        } else {
            image.resize_exact(target_w, target_h, FilterType::Lanczos3)
        };

        let format = output_format(&resized, source_format);
        let bytes = encode(&resized, format)?;
        Ok(NormalizedImage {
            bytes,
            width: resized.width(),
            height: resized.height(),
            format,
        })
    }
}

fn decode_failure(err: ImageError) -> AnalysisFailure {
    match err {
        ImageError::Limits(e) => {
            AnalysisFailure::invalid_input(format!("Image dimensions too large to decode: {}", e))
        }
        e => AnalysisFailure::decode(format!("Invalid or corrupted image file: {}", e)),
    }
}

/// Longer edge becomes `cap`; the shorter edge is rounded to the nearest pixel.
pub fn scaled_dimensions(width: u32, height: u32, cap: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= cap {
        return (width, height);
    }
    let scale = |edge: u32| -> u32 {
        let scaled = (edge as u64 * cap as u64 + longest as u64 / 2) / longest as u64;
        (scaled as u32).clamp(1, cap)
    };
    if width >= height {
        (cap, scale(height))
    } else {
        (scale(width), cap)
    }
}

fn output_format(image: &DynamicImage, source: ImageFormat) -> ImageFormat {
    if image.color().has_alpha() {
        ImageFormat::Png
    } else if source == ImageFormat::Jpeg {
        ImageFormat::Jpeg
    } else {
        ImageFormat::Png
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, AnalysisFailure> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            encoder
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| AnalysisFailure::decode(format!("Failed to re-encode image: {}", e)))?;
        }
        _ => {
            image
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(|e| AnalysisFailure::decode(format!("Failed to re-encode image: {}", e)))?;
        }
    }
    Ok(buf)
}
