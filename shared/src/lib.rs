use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisResponse {
    pub analysis: String,
    pub timestamp: String,
    pub filename: String,
}

/// Machine-readable failure category returned with every rejected upload.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    DecodeError,
    UpstreamAuth,
    UpstreamRateLimited,
    UpstreamTimeout,
    UpstreamError,
    UpstreamNetwork,
}

impl FailureKind {
    /// Whether the client may safely resubmit the same upload later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::UpstreamRateLimited
                | FailureKind::UpstreamTimeout
                | FailureKind::UpstreamNetwork
        )
    }

    pub fn is_upstream(&self) -> bool {
        !matches!(self, FailureKind::InvalidInput | FailureKind::DecodeError)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub kind: FailureKind,
    pub error: String,
    pub transient: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}
