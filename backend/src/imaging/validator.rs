use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use log::debug;

use super::is_accepted;
use crate::error::AnalysisFailure;

/// Cheap admission checks run before any full decode.
#[derive(Debug, Clone)]
pub struct ImageValidator {
    max_upload_bytes: usize,
}

impl ImageValidator {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Returns the sniffed format on success. Size is checked before the bytes are looked at.
    pub fn validate(
        &self,
        bytes: &[u8],
        declared_content_type: &str,
        byte_length: usize,
    ) -> Result<ImageFormat, AnalysisFailure> {
        if byte_length > self.max_upload_bytes {
            return Err(AnalysisFailure::payload_too_large(
                byte_length,
                self.max_upload_bytes,
            ));
        }

        if bytes.is_empty() || byte_length == 0 {
            return Err(AnalysisFailure::invalid_input("Uploaded file is empty"));
        }

        let declared = declared_format(declared_content_type).ok_or_else(|| {
            AnalysisFailure::invalid_input(format!(
                "Invalid file type {:?}. Please upload a JPEG, PNG, GIF or WebP image.",
                declared_content_type
            ))
        })?;

        let sniffed = image::guess_format(bytes)
            .map_err(|_| AnalysisFailure::decode("Invalid or corrupted image file"))?;
        if !is_accepted(sniffed) {
            return Err(AnalysisFailure::invalid_input(format!(
                "Unsupported image format {:?}. Please upload a JPEG, PNG, GIF or WebP image.",
                sniffed
            )));
        }
        if sniffed != declared {
            debug!(
                "Declared content type {} does not match sniffed format {:?}",
                declared_content_type, sniffed
            );
        }

        let (width, height) = ImageReader::with_format(Cursor::new(bytes), sniffed)
            .into_dimensions()
            .map_err(|e| AnalysisFailure::decode(format!("Invalid or corrupted image file: {}", e)))?;
        if width == 0 || height == 0 {
            return Err(AnalysisFailure::decode("Image has no pixels"));
        }

        Ok(sniffed)
    }
}

fn declared_format(content_type: &str) -> Option<ImageFormat> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}
