use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::imaging::normalizer::DEFAULT_MAX_PIXELS;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const MAX_RETRY_LIMIT: u32 = 5;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Retry settings for transient upstream failures. `max_retries == 0` disables retrying.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

impl FromStr for ImageDetail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(ImageDetail::Low),
            "high" => Ok(ImageDetail::High),
            "auto" => Ok(ImageDetail::Auto),
            other => Err(format!("expected low, high or auto, got {:?}", other)),
        }
    }
}

/// Process-wide settings, read once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_base: Url,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub image_detail: ImageDetail,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub max_image_dimension: u32,
    pub max_image_pixels: u64,
    pub retry: RetryConfig,
    pub allowed_origins: Vec<String>,
    pub host: String,
    pub port: u16,
}

// Hand-written so the credential never ends up in logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("image_detail", &self.image_detail)
            .field("request_timeout", &self.request_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("max_image_pixels", &self.max_image_pixels)
            .field("retry", &self.retry)
            .field("allowed_origins", &self.allowed_origins)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let api_base_raw = get("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&api_base_raw).map_err(|e| ConfigError::Invalid {
            name: "OPENAI_API_BASE",
            reason: e.to_string(),
        })?;
        if !matches!(api_base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "OPENAI_API_BASE",
                reason: format!("unsupported scheme {}", api_base.scheme()),
            });
        }

        let model = get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens: u32 = parse_or(&get, "OPENAI_MAX_TOKENS", 2000)?;

        let temperature: f32 = parse_or(&get, "OPENAI_TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                name: "OPENAI_TEMPERATURE",
                reason: format!("{} is outside 0..=2", temperature),
            });
        }

        let image_detail: ImageDetail = parse_or(&get, "OPENAI_IMAGE_DETAIL", ImageDetail::High)?;

        let timeout_secs: u64 = parse_or(&get, "OPENAI_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "OPENAI_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let max_upload_mb: usize = parse_or(&get, "MAX_UPLOAD_SIZE_MB", 10)?;
        if max_upload_mb == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_UPLOAD_SIZE_MB",
                reason: "must be greater than zero".to_string(),
            });
        }
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            ConfigError::Invalid {
                name: "MAX_UPLOAD_SIZE_MB",
                reason: format!("{} MiB overflows the byte limit", max_upload_mb),
            }
        })?;
        let max_image_dimension: u32 = parse_or(&get, "MAX_IMAGE_DIMENSION", 2048)?;
        if max_image_dimension == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_IMAGE_DIMENSION",
                reason: "must be greater than zero".to_string(),
            });
        }

        let max_image_pixels: u64 = parse_or(&get, "MAX_IMAGE_PIXELS", DEFAULT_MAX_PIXELS)?;
        if max_image_pixels == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_IMAGE_PIXELS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let max_retries: u32 = parse_or(&get, "ANALYSIS_MAX_RETRIES", 0)?;
        if max_retries > MAX_RETRY_LIMIT {
            return Err(ConfigError::Invalid {
                name: "ANALYSIS_MAX_RETRIES",
                reason: format!("at most {} retries are allowed", MAX_RETRY_LIMIT),
            });
        }
        let base_ms: u64 = parse_or(&get, "ANALYSIS_RETRY_BASE_MS", 500)?;
        let max_delay = RetryConfig::default().max_delay;
        if Duration::from_millis(base_ms) > max_delay {
            return Err(ConfigError::Invalid {
                name: "ANALYSIS_RETRY_BASE_MS",
                reason: format!("must not exceed {} ms", max_delay.as_millis()),
            });
        }

        let allowed_origins = get("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&get, "PORT", 8000)?;

        Ok(Self {
            api_key,
            api_base,
            model,
            max_tokens,
            temperature,
            image_detail,
            request_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes,
            max_image_dimension,
            max_image_pixels,
            retry: RetryConfig {
                max_retries,
                base_delay: Duration::from_millis(base_ms),
                ..RetryConfig::default()
            },
            allowed_origins,
            host,
            port,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("{:?}: {}", raw, e),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.api_base.as_str(), "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.image_detail, ImageDetail::High);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_image_dimension, 2048);
        assert_eq!(config.max_image_pixels, 150_000_000);
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.allows_any_origin());
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn missing_or_blank_key_is_fatal() {
        assert_eq!(
            config_from(&[]).unwrap_err(),
            ConfigError::Missing("OPENAI_API_KEY")
        );
        assert_eq!(
            config_from(&[("OPENAI_API_KEY", "   ")]).unwrap_err(),
            ConfigError::Missing("OPENAI_API_KEY")
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MAX_UPLOAD_SIZE_MB", "2"),
            ("MAX_IMAGE_DIMENSION", "1024"),
            ("OPENAI_TIMEOUT_SECS", "15"),
            ("OPENAI_IMAGE_DETAIL", "LOW"),
            ("ANALYSIS_MAX_RETRIES", "2"),
            ("ALLOWED_ORIGINS", "http://localhost:3000, https://charts.example.com"),
        ])
        .unwrap();
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.max_image_dimension, 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.image_detail, ImageDetail::Low);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000", "https://charts.example.com"]
        );
        assert!(!config.allows_any_origin());
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config_from(&[("OPENAI_API_KEY", "k"), ("MAX_IMAGE_DIMENSION", "big")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "MAX_IMAGE_DIMENSION",
                ..
            }
        ));

        let err = config_from(&[("OPENAI_API_KEY", "k"), ("OPENAI_TIMEOUT_SECS", "0")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "OPENAI_TIMEOUT_SECS",
                ..
            }
        ));

        let err = config_from(&[("OPENAI_API_KEY", "k"), ("ANALYSIS_MAX_RETRIES", "50")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "ANALYSIS_MAX_RETRIES",
                ..
            }
        ));

        for upload_mb in ["0", "18446744073709551615"] {
            let err = config_from(&[("OPENAI_API_KEY", "k"), ("MAX_UPLOAD_SIZE_MB", upload_mb)])
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::Invalid {
                        name: "MAX_UPLOAD_SIZE_MB",
                        ..
                    }
                ),
                "{}",
                upload_mb
            );
        }

        let err = config_from(&[("OPENAI_API_KEY", "k"), ("ANALYSIS_RETRY_BASE_MS", "60000")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "ANALYSIS_RETRY_BASE_MS",
                ..
            }
        ));

        let err = config_from(&[("OPENAI_API_KEY", "k"), ("MAX_IMAGE_PIXELS", "0")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "MAX_IMAGE_PIXELS",
                ..
            }
        ));

        let err = config_from(&[("OPENAI_API_KEY", "k"), ("OPENAI_API_BASE", "ftp://x")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "OPENAI_API_BASE",
                ..
            }
        ));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-secret-value")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
