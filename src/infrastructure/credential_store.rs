use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// ID token issued by the identity provider at sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl IdToken {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Result<Self, InfraError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(InfraError::Credential("id token must not be empty".to_string()));
        }
        Ok(Self { token, issued_at })
    }
}

pub trait CredentialStore: Send + Sync {
    fn save_token(&self, token: &IdToken) -> Result<(), InfraError>;
    fn load_token(&self) -> Result<Option<IdToken>, InfraError>;
    fn delete_token(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    token: Mutex<Option<IdToken>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, token: &IdToken) -> Result<(), InfraError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(token.clone());
        Ok(())
    }

    fn load_token(&self) -> Result<Option<IdToken>, InfraError> {
        let guard = self
            .token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}
