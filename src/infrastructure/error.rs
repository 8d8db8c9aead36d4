use crate::domain::timer::TimerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("network error: {0}")]
    Network(String),
    #[error("backend error: http {status}{}", body_suffix(.body))]
    Http { status: u16, body: String },
    #[error("not authorized; sign in again")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("credential store error: {0}")]
    Credential(String),
    #[error("model error: {0}")]
    Model(String),
    #[error(transparent)]
    Timer(#[from] TimerError),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("; body={body}")
    }
}

impl InfraError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound(if body.trim().is_empty() {
                "resource".to_string()
            } else {
                body.trim().to_string()
            }),
            code => Self::Http {
                status: code,
                body: body.trim().to_string(),
            },
        }
    }
}
