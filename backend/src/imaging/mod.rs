pub mod normalizer;
pub mod validator;

pub use normalizer::ImageNormalizer;
pub use validator::ImageValidator;

use image::ImageFormat;

/// Raster formats the vision provider accepts inline.
pub const ACCEPTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

pub fn is_accepted(format: ImageFormat) -> bool {
    ACCEPTED_FORMATS.contains(&format)
}
