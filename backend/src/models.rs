use chrono::{DateTime, SecondsFormat, Utc};
use image::ImageFormat;
use shared::AnalysisResponse;

/// A chart as received from the client. Lives only for one request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
    pub byte_length: usize,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>, filename: impl Into<String>) -> Self {
        let byte_length = bytes.len();
        Self {
            bytes,
            content_type: content_type.into(),
            filename: filename.into(),
            byte_length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl NormalizedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub analysis: String,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
}

impl From<AnalysisResult> for AnalysisResponse {
    fn from(result: AnalysisResult) -> Self {
        Self {
            analysis: result.analysis,
            timestamp: result.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            filename: result.filename,
        }
    }
}
