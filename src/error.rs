use std::any::Any;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid project specification: {0}")]
    Spec(String),

    #[error("Scaffolding failed: {0}")]
    Scaffold(String),

    #[error("Suggestion generator error: {0}")]
    Suggestion(String),

    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Collaborator failure carrying the message of a caught panic.
    pub fn from_panic(what: &str, payload: &(dyn Any + Send)) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        AppError::Collaborator(format!("{what} panicked: {detail}"))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
