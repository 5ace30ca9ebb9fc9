#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use trading_analyzer::analysis::{AnalysisRequest, VisionModel};
use trading_analyzer::config::AppConfig;
use trading_analyzer::error::AnalysisFailure;

pub const BOUNDARY: &str = "----chart-upload-boundary-7MA4YWxk";

pub fn config(overrides: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn chart(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// Single-field `multipart/form-data` body, returned with its content type.
pub fn multipart(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

/// Always answers with the same outcome and remembers the image sizes it saw.
pub struct StubModel {
    reply: Result<String, AnalysisFailure>,
    calls: AtomicUsize,
    sizes: Mutex<Vec<(u32, u32)>>,
}

impl StubModel {
    pub fn replying(text: &str) -> Self {
        Self::new(Ok(text.to_string()))
    }

    pub fn failing(failure: AnalysisFailure) -> Self {
        Self::new(Err(failure))
    }

    fn new(reply: Result<String, AnalysisFailure>) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sizes(&self) -> Vec<(u32, u32)> {
        self.sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for StubModel {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes
            .lock()
            .unwrap()
            .push((request.image().width, request.image().height));
        self.reply.clone()
    }
}
