pub mod claude;
pub mod prompt;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use claude::ClaudeClient;

/// Source excerpts and output handed to a suggestion generator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub test_output: String,
    pub error: String,
    /// File path -> excerpt around the failing line.
    pub relevant_code: BTreeMap<String, String>,
}

/// Produces free-text remediation advice for a failing test run.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn analyze_error(&self, error_text: &str, context: &ErrorContext) -> Result<String>;
}
