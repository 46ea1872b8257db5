use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::runner::outcome::TestStatus;

/// Pipeline stages in execution order, followed by the two terminal stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Input,
    Scaffold,
    Generate,
    Test,
    Debug,
    Verify,
    Complete,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Input => "input",
            PipelineStage::Scaffold => "scaffold",
            PipelineStage::Generate => "generate",
            PipelineStage::Test => "test",
            PipelineStage::Debug => "debug",
            PipelineStage::Verify => "verify",
            PipelineStage::Complete => "complete",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed)
    }

    fn position(&self) -> u8 {
        match self {
            PipelineStage::Input => 0,
            PipelineStage::Scaffold => 1,
            PipelineStage::Generate => 2,
            PipelineStage::Test => 3,
            PipelineStage::Debug => 4,
            PipelineStage::Verify => 5,
            PipelineStage::Complete => 6,
            PipelineStage::Failed => 7,
        }
    }

    /// Forward moves only; `Failed` is reachable from any non-terminal stage.
    pub fn can_advance_to(&self, next: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == PipelineStage::Failed || next.position() > self.position()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the test stage (and a successful debug loop) recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub status: Option<TestStatus>,
    pub output: String,
    pub details: BTreeMap<String, u64>,
}

/// Everything one pipeline run accumulates. Owned by that run alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    stage: PipelineStage,
    pub project_name: String,
    pub project_dir: PathBuf,
    pub iterations: u32,
    pub errors: Vec<String>,
    pub generated_files: Vec<PathBuf>,
    pub test_results: TestSummary,
    pub started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            stage: PipelineStage::Input,
            project_name: String::new(),
            project_dir: PathBuf::new(),
            iterations: 0,
            errors: Vec::new(),
            generated_files: Vec::new(),
            test_results: TestSummary::default(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to `next`, stamping the completion time on reaching a terminal stage.
    pub fn advance(&mut self, next: PipelineStage) -> Result<()> {
        if !self.stage.can_advance_to(next) {
            return Err(AppError::Internal(format!(
                "illegal stage transition {} -> {}",
                self.stage, next
            )));
        }
        tracing::debug!(from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record `error` and jump to `Failed`. No-op on the stage if already terminal.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        if !self.is_terminal() {
            // Non-terminal to Failed is always legal.
            let _ = self.advance(PipelineStage::Failed);
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_and_skips() {
        let mut state = PipelineState::new();
        state.advance(PipelineStage::Scaffold).unwrap();
        state.advance(PipelineStage::Generate).unwrap();
        state.advance(PipelineStage::Test).unwrap();
        state.advance(PipelineStage::Verify).unwrap();
        assert!(state.completed_at().is_none());
        state.advance(PipelineStage::Complete).unwrap();
        assert!(state.completed_at().is_some());
    }

    #[test]
    fn test_regression_is_rejected() {
        let mut state = PipelineState::new();
        state.advance(PipelineStage::Test).unwrap();
        let err = state.advance(PipelineStage::Scaffold).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(state.stage(), PipelineStage::Test);
    }

    #[test]
    fn test_terminal_is_final_and_stamped_once() {
        let mut state = PipelineState::new();
        state.fail("cancelled");
        let stamped = state.completed_at();
        assert_eq!(state.stage(), PipelineStage::Failed);
        assert!(stamped.is_some());

        assert!(state.advance(PipelineStage::Complete).is_err());
        state.fail("again");
        assert_eq!(state.completed_at(), stamped);
        assert_eq!(state.errors, vec!["cancelled".to_string(), "again".to_string()]);
    }

    #[test]
    fn test_json_uses_lowercase_stage() {
        let mut state = PipelineState::new();
        state.project_name = "demo".to_string();
        state.advance(PipelineStage::Debug).unwrap();
        let json: serde_json::Value = serde_json::from_str(&state.to_json().unwrap()).unwrap();
        assert_eq!(json["stage"], "debug");
        assert_eq!(json["project_name"], "demo");
        assert!(json["completed_at"].is_null());
    }
}
