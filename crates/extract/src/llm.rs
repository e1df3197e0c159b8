use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::parse::AnalysisParseError;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_URL.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error(transparent)]
    Parse(#[from] AnalysisParseError),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Thin client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send the parts as one user turn and return the first candidate's text.
    /// With `json` set the model is asked for an `application/json` response.
    pub async fn generate(&self, parts: &[&str], json: bool) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: parts.iter().map(|&text| Part { text }).collect(),
            }],
            generation_config: json.then_some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };

        let response = self.client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(model = %self.config.model, status = status.as_u16(), "Gemini request failed");
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            AnalysisParseError::ParseFailure {
                message: format!("unexpected response envelope: {e}"),
                raw: body.clone(),
            }
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        debug!(model = %self.config.model, chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: "gemini-key".to_string(),
            model: "gemini-pro".to_string(),
            base_url: server.uri(),
        })
    }

    #[tokio::test]
    async fn test_generate_joins_candidate_parts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .and(header("x-goog-api-key", "gemini-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [{"text": "instruction"}, {"text": "body"}]
                }],
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .generate(&["instruction", "body"], true)
            .await
            .unwrap();

        assert_eq!(text, "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate(&["x"], false).await.unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Status { status: 403, ref body } if body == "bad key"
        ));
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).generate(&["x"], false).await.unwrap_err();

        assert!(matches!(err, AnalysisError::EmptyResponse));
    }
}
