use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub interactive: bool,
    /// Number of characters of test output kept in the pipeline state.
    #[serde(default = "default_output_preview_chars")]
    pub output_preview_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    #[serde(default = "default_suite_timeout_secs")]
    pub suite_timeout_secs: u64,
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
    /// Delay between SIGTERM and SIGKILL when a timed-out process group is torn down.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_node")]
    pub node: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_pattern_confidence")]
    pub pattern_confidence: f64,
    #[serde(default = "default_suggestion_confidence")]
    pub suggestion_confidence: f64,
}

#[derive(Deserialize, Clone)]
pub struct SuggestionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for SuggestionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./generated_projects")
}

fn default_output_preview_chars() -> usize {
    1000
}

fn default_suite_timeout_secs() -> u64 {
    300
}

fn default_file_timeout_secs() -> u64 {
    60
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_node() -> String {
    "node".to_string()
}

fn default_max_iterations() -> u32 {
    5
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_pattern_confidence() -> f64 {
    0.5
}

fn default_suggestion_confidence() -> f64 {
    0.6
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            interactive: false,
            output_preview_chars: default_output_preview_chars(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            suite_timeout_secs: default_suite_timeout_secs(),
            file_timeout_secs: default_file_timeout_secs(),
            kill_grace_ms: default_kill_grace_ms(),
            python: default_python(),
            node: default_node(),
        }
    }
}

impl RunnerConfig {
    pub fn suite_timeout(&self) -> Duration {
        Duration::from_secs(self.suite_timeout_secs)
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            confidence_threshold: default_confidence_threshold(),
            pattern_confidence: default_pattern_confidence(),
            suggestion_confidence: default_suggestion_confidence(),
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl SuggestionConfig {
    /// Configured key, falling back to `ANTHROPIC_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("projforge").required(false));
        }

        // Environment variable overrides with PROJFORGE_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("PROJFORGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let loaded: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<()> {
        let debug = &self.debug;
        for (name, value) in [
            ("confidence_threshold", debug.confidence_threshold),
            ("pattern_confidence", debug.pattern_confidence),
            ("suggestion_confidence", debug.suggestion_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "debug.{name} must be within [0.0, 1.0], got {value}"
                )));
            }
        }
        if self.runner.suite_timeout_secs == 0 || self.runner.file_timeout_secs == 0 {
            return Err(AppError::Config("runner timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.runner.suite_timeout_secs, 300);
        assert_eq!(config.runner.file_timeout_secs, 60);
        assert_eq!(config.debug.max_iterations, 5);
        assert_eq!(config.debug.confidence_threshold, 0.7);
        assert_eq!(config.debug.pattern_confidence, 0.5);
        assert_eq!(config.debug.suggestion_confidence, 0.6);
        assert!(!config.pipeline.interactive);
    }

    #[test]
    fn test_load_from_file_applies_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(
            &path,
            "[debug]\nmax_iterations = 2\n\n[runner]\nsuite_timeout_secs = 10\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.debug.max_iterations, 2);
        assert_eq!(config.runner.suite_timeout_secs, 10);
        assert_eq!(config.runner.file_timeout_secs, 60);
    }

    #[test]
    fn test_load_rejects_out_of_range_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[debug]\nconfidence_threshold = 1.5\n").unwrap();

        let err = AppConfig::load(Some(path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let config = SuggestionConfig {
            api_key: Some("sk-secret".to_string()),
            ..SuggestionConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
