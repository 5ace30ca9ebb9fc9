use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use shared::FailureKind;

use super::request::AnalysisRequest;
use crate::config::{AppConfig, ImageDetail};
use crate::error::AnalysisFailure;

/// The one capability the pipeline needs from a remote model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Returns the model's text exactly as produced.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisFailure>;
}

/// Chat-completions client for OpenAI-compatible vision models.
#[derive(Clone)]
pub struct OpenAiVisionClient {
    http_client: HttpClient,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    detail: ImageDetail,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

impl OpenAiVisionClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()?;
        let endpoint = format!(
            "{}/chat/completions",
            config.api_base.as_str().trim_end_matches('/')
        );
        Ok(Self {
            http_client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            detail: config.image_detail,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn payload<'a>(&'a self, request: &'a AnalysisRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: request.prompt(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: request.image_data_url(),
                            detail: self.detail.as_str(),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisFailure> {
        debug!(
            "Sending {}x{} {} chart to {} (model {}, prompt {})",
            request.image().width,
            request.image().height,
            request.image().mime_type(),
            self.endpoint,
            self.model,
            request.prompt_version()
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_body_error)?;

        if !status.is_success() {
            let failure = classify_status(status, &body);
            error!("Vision API returned {}: {}", status, failure.message());
            return Err(failure);
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            AnalysisFailure::new(
                FailureKind::UpstreamError,
                format!("Malformed response from vision API: {}", e),
            )
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AnalysisFailure::new(
                    FailureKind::UpstreamError,
                    "Vision API response contained no analysis text",
                )
            })
    }
}

fn classify_transport_error(err: reqwest::Error) -> AnalysisFailure {
    if err.is_timeout() {
        AnalysisFailure::new(
            FailureKind::UpstreamTimeout,
            "Timed out waiting for the vision API",
        )
    } else {
        AnalysisFailure::new(
            FailureKind::UpstreamNetwork,
            format!("Could not reach the vision API: {}", err),
        )
    }
}

// The connection was established, so a failed read means a bad response rather than an unreachable host.
fn classify_body_error(err: reqwest::Error) -> AnalysisFailure {
    if err.is_timeout() {
        AnalysisFailure::new(
            FailureKind::UpstreamTimeout,
            "Timed out waiting for the vision API",
        )
    } else {
        AnalysisFailure::new(
            FailureKind::UpstreamError,
            format!("Malformed response from vision API: {}", err),
        )
    }
}

fn classify_status(status: StatusCode, body: &str) -> AnalysisFailure {
    let detail = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::UpstreamAuth,
        StatusCode::TOO_MANY_REQUESTS => FailureKind::UpstreamRateLimited,
        StatusCode::REQUEST_TIMEOUT => FailureKind::UpstreamTimeout,
        _ => FailureKind::UpstreamError,
    };
    let prefix = match kind {
        FailureKind::UpstreamAuth => "Vision API rejected the credential",
        FailureKind::UpstreamRateLimited => "Vision API rate limit reached",
        FailureKind::UpstreamTimeout => "Vision API timed out",
        _ if status.is_client_error() => "Vision API rejected the request",
        _ => "Vision API failed",
    };
    AnalysisFailure::new(kind, format!("{} ({}): {}", prefix, status.as_u16(), detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::request::AnalysisRequestBuilder;
    use crate::models::NormalizedImage;
    use image::ImageFormat;
    use std::collections::HashMap;

    fn client() -> OpenAiVisionClient {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_API_BASE", "http://localhost:9/v1/"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        OpenAiVisionClient::new(&config).unwrap()
    }

    #[test]
    fn endpoint_is_joined_without_double_slash() {
        assert_eq!(client().endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[test]
    fn payload_has_text_then_image_part() {
        let client = client();
        let request = AnalysisRequestBuilder::new().build(NormalizedImage {
            bytes: vec![0xFF, 0xD8],
            width: 1,
            height: 1,
            format: ImageFormat::Jpeg,
        });
        let json = serde_json::to_value(client.payload(&request)).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 2000);
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["detail"], "high");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,/9g=");
    }

    #[test]
    fn status_codes_are_classified() {
        let cases = [
            (StatusCode::UNAUTHORIZED, FailureKind::UpstreamAuth),
            (StatusCode::FORBIDDEN, FailureKind::UpstreamAuth),
            (StatusCode::TOO_MANY_REQUESTS, FailureKind::UpstreamRateLimited),
            (StatusCode::REQUEST_TIMEOUT, FailureKind::UpstreamTimeout),
            (StatusCode::BAD_REQUEST, FailureKind::UpstreamError),
            (StatusCode::INTERNAL_SERVER_ERROR, FailureKind::UpstreamError),
            (StatusCode::SERVICE_UNAVAILABLE, FailureKind::UpstreamError),
        ];
        for (status, kind) in cases {
            assert_eq!(classify_status(status, "").kind(), kind, "{}", status);
        }
    }

    #[test]
    fn provider_error_message_is_surfaced() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let failure = classify_status(StatusCode::UNAUTHORIZED, body);
        assert!(failure.message().contains("Incorrect API key provided"));
        assert!(failure.message().contains("401"));
    }
}
