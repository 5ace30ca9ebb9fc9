use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::FailureKind;

use super::client::VisionModel;
use super::request::{AnalysisRequest, AnalysisRequestBuilder};
use crate::config::{AppConfig, RetryConfig};
use crate::error::AnalysisFailure;
use crate::imaging::{ImageNormalizer, ImageValidator};
use crate::models::{AnalysisResult, UploadedImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Normalized,
    RequestBuilt,
    Dispatched,
    Succeeded,
    Failed,
}

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self::from(&RetryConfig::default())
    }

    /// `base_delay` is clamped to `max_delay`, which always bounds every wait.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: base_delay.min(max_delay),
            max_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Auth and request-shape failures need an operator, never a retry.
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> bool {
        attempt < self.max_retries
            && matches!(
                kind,
                FailureKind::UpstreamRateLimited
                    | FailureKind::UpstreamNetwork
                    | FailureKind::UpstreamTimeout
            )
    }

    /// Delay before retry number `attempt + 1`, with up to 50% jitter, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.max_delay);
        let jitter_ms = (exp.as_millis() as u64) / 2;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        (exp + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay, config.max_delay)
    }
}

/// Runs one upload through validate → normalize → build → dispatch.
#[derive(Clone)]
pub struct AnalysisPipeline {
    validator: ImageValidator,
    normalizer: ImageNormalizer,
    builder: AnalysisRequestBuilder,
    model: Arc<dyn VisionModel>,
    retry: RetryPolicy,
}

impl AnalysisPipeline {
    pub fn new(config: &AppConfig, model: Arc<dyn VisionModel>) -> Self {
        Self {
            validator: ImageValidator::new(config.max_upload_bytes),
            normalizer: ImageNormalizer::new(config.max_image_dimension)
                .with_max_pixels(config.max_image_pixels),
            builder: AnalysisRequestBuilder::new(),
            model,
            retry: RetryPolicy::from(&config.retry),
        }
    }

    pub fn from_parts(
        validator: ImageValidator,
        normalizer: ImageNormalizer,
        model: Arc<dyn VisionModel>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            validator,
            normalizer,
            builder: AnalysisRequestBuilder::new(),
            model,
            retry,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.validator.max_upload_bytes()
    }

    pub async fn run(&self, upload: UploadedImage) -> Result<AnalysisResult, AnalysisFailure> {
        let mut stage = Stage::Received;
        match self.advance(upload, &mut stage).await {
            Ok(result) => {
                debug!("{:?} -> {:?}", stage, Stage::Succeeded);
                Ok(result)
            }
            Err(failure) => {
                if failure.kind().is_upstream() {
                    error!("Analysis failed after {:?}: {}", stage, failure);
                } else {
                    warn!("Upload rejected after {:?}: {}", stage, failure);
                }
                debug!("{:?} -> {:?}", stage, Stage::Failed);
                Err(failure.at_stage(stage))
            }
        }
    }

    async fn advance(
        &self,
        upload: UploadedImage,
        stage: &mut Stage,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        let UploadedImage {
            bytes,
            content_type,
            filename,
            byte_length,
        } = upload;

        self.validator.validate(&bytes, &content_type, byte_length)?;
        transition(stage, Stage::Validated);

        let normalized = self.normalizer.normalize(&bytes)?;
        drop(bytes);
        transition(stage, Stage::Normalized);

        let request = self.builder.build(normalized);
        transition(stage, Stage::RequestBuilt);

        transition(stage, Stage::Dispatched);
        let analysis = self.dispatch(&request).await?;

        let result = AnalysisResult {
            analysis,
            timestamp: Utc::now(),
            filename,
        };
        info!(
            "Analyzed {} ({} chars)",
            result.filename,
            result.analysis.len()
        );
        Ok(result)
    }

    async fn dispatch(&self, request: &AnalysisRequest) -> Result<String, AnalysisFailure> {
        let mut attempt = 0;
        loop {
            match self.model.analyze(request).await {
                Ok(text) => return Ok(text),
                Err(failure) if self.retry.should_retry(failure.kind(), attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "Retrying vision call ({}/{}) in {:?} after {}",
                        attempt,
                        self.retry.max_retries(),
                        delay,
                        failure
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

fn transition(stage: &mut Stage, next: Stage) {
    debug!("{:?} -> {:?}", stage, next);
    *stage = next;
}
