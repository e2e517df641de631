use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClassifierConfig;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Classification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Classifier returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Classifier returned malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("Classifier response is not a list of scored labels: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Request body: `{"inputs": {"image": "<base64>"}}`
#[derive(Debug, Serialize)]
pub struct ClassificationRequest<'a> {
    inputs: ImageInputs<'a>,
}

#[derive(Debug, Serialize)]
struct ImageInputs<'a> {
    image: &'a str,
}

impl<'a> ClassificationRequest<'a> {
    pub fn new(encoded_image: &'a str) -> Self {
        Self {
            inputs: ImageInputs {
                image: encoded_image,
            },
        }
    }
}

/// One label/score pair; labels look like `"30-39"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f64,
}

pub type ClassificationResponse = Vec<ScoredLabel>;

/// Error body returned by the inference service, e.g. while the model loads.
#[derive(Debug, Deserialize)]
struct ServiceError {
    error: String,
}

pub struct ClassificationClient {
    config: ClassifierConfig,
    client: Client,
}

impl ClassificationClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifyError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// POST the encoded image and wait for the scored labels.
    pub async fn classify(&self, encoded_image: &str) -> Result<ClassificationResponse, ClassifyError> {
        info!(
            "Classifying {} byte payload via {}",
            encoded_image.len(),
            self.config.endpoint
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_token)
            .json(&ClassificationRequest::new(encoded_image))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!("Classifier returned {}: {}", status, message);
            return Err(ClassifyError::Status { status, message });
        }

        let predictions = parse_response(&body)?;
        debug!("Received {} predictions", predictions.len());

        Ok(predictions)
    }
}

/// Parse a success body, telling "not JSON" apart from "wrong JSON".
pub fn parse_response(body: &str) -> Result<ClassificationResponse, ClassifyError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(ClassifyError::MalformedJson)?;
    serde_json::from_value(value).map_err(ClassifyError::Shape)
}

fn error_message(body: &str) -> String {
    if let Ok(service_error) = serde_json::from_str::<ServiceError>(body) {
        return service_error.error;
    }

    let body = body.trim();
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{}...", truncated);
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ClassificationClient {
        let config = ClassifierConfig::new(format!("{}/models/age", server.uri()), "test-token");
        ClassificationClient::new(config).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ClassificationRequest::new("/9j/")).unwrap();
        assert_eq!(body, json!({"inputs": {"image": "/9j/"}}));
    }

    #[test]
    fn test_parse_response_errors_are_distinct() {
        assert!(matches!(parse_response("<html>"), Err(ClassifyError::MalformedJson(_))));
        assert!(matches!(parse_response(r#"{"label": "20-29"}"#), Err(ClassifyError::Shape(_))));
        assert!(matches!(
            parse_response(r#"[{"label": "20-29", "score": "high"}]"#),
            Err(ClassifyError::Shape(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_service_error() {
        assert_eq!(
            error_message(r#"{"error": "Model is currently loading", "estimated_time": 20.0}"#),
            "Model is currently loading"
        );
        assert_eq!(error_message(""), "<empty body>");
        assert!(error_message(&"x".repeat(500)).ends_with("..."));
    }

    #[tokio::test]
    async fn test_classify_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/age"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"inputs": {"image": "/9j/"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"label": "20-29", "score": 0.7},
                {"label": "30-39", "score": 0.2}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let predictions = client.classify("/9j/").await.unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].label, "20-29");
        assert_eq!(predictions[1].score, 0.2);
    }

    #[tokio::test]
    async fn test_classify_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "Model is currently loading"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        match client.classify("/9j/").await {
            Err(ClassifyError::Status { status, message }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "Model is currently loading");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_unexpected_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"predictions": []})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(matches!(client.classify("/9j/").await, Err(ClassifyError::Shape(_))));
    }

    #[tokio::test]
    async fn test_classify_unreachable() {
        // Nothing listens on the discard port
        let config = ClassifierConfig::new("http://127.0.0.1:9/models/age", "test-token");
        let client = ClassificationClient::new(config).unwrap();
        assert!(matches!(client.classify("/9j/").await, Err(ClassifyError::Transport(_))));
    }
}
