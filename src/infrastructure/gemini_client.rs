//! Hosted text-generation model used for schedule and progress summaries.

use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Turns a free-form prompt into natural-language text.
#[async_trait]
pub trait SummaryModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGeminiClient {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

#[derive(Debug, serde::Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl ReqwestGeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, InfraError> {
        let api_key = api_key.into();
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(InfraError::InvalidConfig("gemini api key must not be empty".to_string()));
        }
        if model.trim().is_empty() {
            return Err(InfraError::InvalidConfig("gemini model must not be empty".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            api_key: api_key.trim().to_string(),
            model: model.trim().to_string(),
            api_base: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn generate_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid gemini api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("gemini api base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("models");
            segments.push(&format!("{}:generateContent", self.model));
        }
        Ok(url)
    }
}

fn extract_text(body: &str) -> Result<String, InfraError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|error| InfraError::Model(format!("invalid generate payload: {error}; body={body}")))?;
    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| InfraError::Model("model returned no text".to_string()))?;
    Ok(text)
}

#[async_trait]
impl SummaryModel for ReqwestGeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, InfraError> {
        if prompt.trim().is_empty() {
            return Err(InfraError::InvalidInput("prompt must not be empty".to_string()));
        }

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(self.generate_endpoint()?)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while generating text: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading generate response: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::Model(format!(
                "gemini api error: http {}; body={body}",
                status.as_u16()
            )));
        }

        let text = extract_text(&body)?;
        tracing::debug!(model = %self.model, chars = text.len(), "model generated summary");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_targets_generate_content() {
        let client = ReqwestGeminiClient::new("key", "gemini-1.5-flash").expect("client");
        let url = client.generate_endpoint().expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn api_base_can_be_overridden() {
        let client = ReqwestGeminiClient::new("key", "gemini-pro")
            .expect("client")
            .with_api_base("http://127.0.0.1:8089/v1beta");
        let url = client.generate_endpoint().expect("endpoint");
        assert_eq!(url.as_str(), "http://127.0.0.1:8089/v1beta/models/gemini-pro:generateContent");
    }

    #[test]
    fn blank_key_is_a_config_error() {
        assert!(matches!(
            ReqwestGeminiClient::new(" ", "gemini-1.5-flash"),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn text_parts_are_concatenated() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Focus on "},{"text":"math."}]}}]}"#;
        assert_eq!(extract_text(body).expect("text"), "Focus on math.");
    }

    #[test]
    fn empty_candidates_are_an_error() {
        assert!(matches!(extract_text(r#"{"candidates":[]}"#), Err(InfraError::Model(_))));
        assert!(matches!(extract_text("{}"), Err(InfraError::Model(_))));
        assert!(matches!(
            extract_text(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#),
            Err(InfraError::Model(_))
        ));
    }
}
