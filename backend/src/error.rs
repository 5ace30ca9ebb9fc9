use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::{ErrorResponse, FailureKind};

use crate::analysis::pipeline::Stage;

/// Terminal failure of a pipeline invocation, surfaced to the client as JSON.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AnalysisFailure {
    kind: FailureKind,
    message: String,
    too_large: bool,
    stage: Option<Stage>,
}

impl AnalysisFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            too_large: false,
            stage: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidInput, message)
    }

    pub fn payload_too_large(byte_length: usize, limit: usize) -> Self {
        Self {
            too_large: true,
            ..Self::invalid_input(format!(
                "File too large: {} bytes (max {} bytes)",
                byte_length, limit
            ))
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(FailureKind::DecodeError, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Last pipeline stage reached before the failure, when raised by the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub(crate) fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl ResponseError for AnalysisFailure {
    fn status_code(&self) -> StatusCode {
        match self.kind {
            FailureKind::InvalidInput if self.too_large => StatusCode::PAYLOAD_TOO_LARGE,
            FailureKind::InvalidInput | FailureKind::DecodeError => StatusCode::BAD_REQUEST,
            FailureKind::UpstreamAuth | FailureKind::UpstreamError => StatusCode::BAD_GATEWAY,
            FailureKind::UpstreamRateLimited | FailureKind::UpstreamNetwork => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            FailureKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            kind: self.kind,
            error: self.message.clone(),
            transient: self.kind.is_transient(),
        })
    }
}
