use super::{Scorer, ScoringError, ScoringRequest};
use crate::config::ScorerConfig;
use crate::error::{Result, TmrError};
use crate::types::{ScoringResult, Stage};
use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use std::time::Duration;

/// Response body of the real-time endpoint.
///
/// `status == 0` means the service refused to score and `message` holds the
/// reason; otherwise `message` is `[stage_code, confidence]`.
#[derive(Debug, Deserialize)]
struct RealtimeResponse {
    status: i64,
    message: serde_json::Value,
}

/// Client for `POST {server_url}/realtime`
pub struct HttpScorer {
    client: Client,
    base_url: String,
}

impl HttpScorer {
    pub fn new(config: &ScorerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TmrError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Serialize the window for upload
    fn encode_window(request: &ScoringRequest) -> std::result::Result<Vec<u8>, ScoringError> {
        serde_json::to_vec(request)
            .map_err(|e| ScoringError::Decode(format!("Failed to encode window: {}", e)))
    }
}

/// Decode the JSON body of a successful HTTP exchange
fn parse_response(body: &str) -> std::result::Result<ScoringResult, ScoringError> {
    let response: RealtimeResponse = serde_json::from_str(body)
        .map_err(|e| ScoringError::Decode(format!("Invalid JSON: {}", e)))?;

    if response.status == 0 {
        let reason = match &response.message {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(ScoringError::Service(reason));
    }

    let pair = response
        .message
        .as_array()
        .filter(|a| a.len() >= 2)
        .ok_or_else(|| {
            ScoringError::Decode(format!(
                "Expected [stage, confidence], got {}",
                response.message
            ))
        })?;

    let code = pair[0]
        .as_f64()
        .ok_or_else(|| ScoringError::Decode(format!("Stage is not a number: {}", pair[0])))?;
    let stage = Stage::from_code(code as i64)
        .ok_or_else(|| ScoringError::Decode(format!("Unknown stage code {}", code)))?;
    let confidence = pair[1]
        .as_f64()
        .ok_or_else(|| ScoringError::Decode(format!("Confidence is not a number: {}", pair[1])))?;

    Ok(ScoringResult::new(stage, confidence))
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(
        &self,
        request: &ScoringRequest,
    ) -> std::result::Result<ScoringResult, ScoringError> {
        let url = format!("{}/realtime", self.base_url);
        let payload = Self::encode_window(request)?;

        log::debug!("Submitting {} byte window to {}", payload.len(), url);

        let part = multipart::Part::bytes(payload)
            .file_name("stream.json")
            .mime_str("application/json")
            .map_err(|e| ScoringError::Transport(format!("Failed to set MIME type: {}", e)))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("token", request.token.to_string());

        let response = match self.client.post(&url).multipart(form).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let detail = if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else if e.is_connect() {
                    format!("failed to connect: {}", e)
                } else {
                    e.to_string()
                };
                return Err(ScoringError::Transport(detail));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScoringError::Transport(format!("Failed to read response: {}", e)))?;

        parse_response(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let result = parse_response(r#"{"status": 1, "message": [3, 6.5]}"#).unwrap();
        assert_eq!(result, ScoringResult::new(Stage::Nrem3, 6.5));
    }

    #[test]
    fn test_parse_service_failure() {
        let err = parse_response(r#"{"status": 0, "message": "token expired"}"#).unwrap_err();
        assert!(matches!(err, ScoringError::Service(ref m) if m == "token expired"));
        assert_eq!(err.kind(), "service");
    }

    #[test]
    fn test_parse_rejects_unknown_stage() {
        let err = parse_response(r#"{"status": 1, "message": [4, 1.0]}"#).unwrap_err();
        assert!(matches!(err, ScoringError::Decode(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_response("<html>").is_err());
        assert!(parse_response(r#"{"status": 1, "message": [2]}"#).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ScorerConfig {
            server_url: "http://localhost:9000/api/v2/".to_string(),
            ..Default::default()
        };
        let scorer = HttpScorer::new(&config).unwrap();
        assert_eq!(scorer.base_url(), "http://localhost:9000/api/v2");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = ScorerConfig {
            // Port 9 (discard) on localhost is closed on test hosts
            server_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..Default::default()
        };
        let scorer = HttpScorer::new(&config).unwrap();
        let request = ScoringRequest {
            channels: vec![vec![0.0; 4]; 5],
            sampling_rates: [100.0; 5],
            token: "t".into(),
        };
        let err = scorer.score(&request).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
