pub mod config;
pub mod credential_store;
pub mod error;
pub mod gemini_client;
pub mod notifier;
pub mod task_api;
