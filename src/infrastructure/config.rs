use crate::domain::timer::{DEFAULT_BREAK_MINUTES, DEFAULT_FOCUS_MINUTES};
use crate::infrastructure::error::InfraError;
use url::Url;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

const API_URL_KEYS: &[&str] = &["STUDYPLAN_API_URL", "VITE_API_URL"];
const ID_TOKEN_KEYS: &[&str] = &["STUDYPLAN_ID_TOKEN"];
const GEMINI_KEY_KEYS: &[&str] = &[
    "STUDYPLAN_GEMINI_API_KEY",
    "VITE_GEMINI_API_KEY",
    "GEMINI_API_KEY",
];
const GEMINI_MODEL_KEYS: &[&str] = &["STUDYPLAN_GEMINI_MODEL"];
const FOCUS_MINUTES_KEYS: &[&str] = &["STUDYPLAN_FOCUS_MINUTES"];
const BREAK_MINUTES_KEYS: &[&str] = &["STUDYPLAN_BREAK_MINUTES"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: Url,
    pub id_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub focus_minutes: u32,
    pub break_minutes: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = required_lookup_value(&lookup, API_URL_KEYS, "backend base url")?;
        let api_base_url = parse_base_url(&raw_url)?;

        Ok(Self {
            api_base_url,
            id_token: optional_lookup_value(&lookup, ID_TOKEN_KEYS),
            gemini_api_key: optional_lookup_value(&lookup, GEMINI_KEY_KEYS),
            gemini_model: optional_lookup_value(&lookup, GEMINI_MODEL_KEYS)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            focus_minutes: minutes_lookup_value(&lookup, FOCUS_MINUTES_KEYS, DEFAULT_FOCUS_MINUTES)?,
            break_minutes: minutes_lookup_value(&lookup, BREAK_MINUTES_KEYS, DEFAULT_BREAK_MINUTES)?,
        })
    }

    pub fn require_id_token(&self) -> Result<&str, InfraError> {
        self.id_token.as_deref().ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "missing id token (set one of: {})",
                ID_TOKEN_KEYS.join(", ")
            ))
        })
    }

    pub fn require_gemini_api_key(&self) -> Result<&str, InfraError> {
        self.gemini_api_key.as_deref().ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "missing gemini api key (set one of: {})",
                GEMINI_KEY_KEYS.join(", ")
            ))
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let trimmed = raw.trim_end_matches('/');
    let url = Url::parse(trimmed)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid backend base url: {error}")))?;
    if url.cannot_be_a_base() {
        return Err(InfraError::InvalidConfig(
            "backend base url cannot be a base".to_string(),
        ));
    }
    Ok(url)
}

fn required_lookup_value<F>(lookup: &F, keys: &[&str], field_name: &str) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn minutes_lookup_value<F>(lookup: &F, keys: &[&str], default: u32) -> Result<u32, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = optional_lookup_value(lookup, keys) else {
        return Ok(default);
    };
    match raw.parse::<u32>() {
        Ok(minutes) if minutes >= 1 => Ok(minutes),
        _ => Err(InfraError::InvalidConfig(format!(
            "{} must be a whole number of minutes >= 1, got {raw:?}",
            keys.join("/")
        ))),
    }
}
