use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Hosted age-classification model used when no endpoint is configured
pub const DEFAULT_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/nateraw/vit-age-classifier";

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("AGECAM_API_TOKEN is not set; pass --token or set it in the environment")]
    MissingToken,

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Classification endpoint configuration.
#[derive(Clone)]
pub struct ClassifierConfig {
    /// Inference endpoint URL
    pub endpoint: String,
    /// Bearer credential
    pub api_token: String,
    /// Upper bound on one classification call
    pub timeout: Duration,
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClassifierConfig {
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: api_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create config from environment variables.
    ///
    /// A missing token is only an error once [`validate`](Self::validate) runs,
    /// so command-line flags get a chance to supply it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = match std::env::var("AGECAM_TIMEOUT_SECS") {
            Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "AGECAM_TIMEOUT_SECS",
                value,
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        let endpoint = std::env::var("AGECAM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let api_token = std::env::var("AGECAM_API_TOKEN").unwrap_or_default();

        Ok(Self::new(endpoint, api_token).with_timeout(Duration::from_secs(timeout_secs)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "endpoint",
                value: self.endpoint.clone(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "timeout",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClassifierConfig::new(DEFAULT_ENDPOINT, "hf_token");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_token() {
        let config = ClassifierConfig::new(DEFAULT_ENDPOINT, "  ");
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_bad_endpoint() {
        let config = ClassifierConfig::new("ftp://example.com", "hf_token");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { name: "endpoint", .. })));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClassifierConfig::new(DEFAULT_ENDPOINT, "hf_secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hf_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
