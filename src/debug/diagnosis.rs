use std::path::PathBuf;

use serde::Serialize;

/// Where a diagnosis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosisSource {
    /// Matched against the table of well-known error categories.
    Pattern,
    /// Produced by an external suggestion generator.
    Suggestion,
}

/// A candidate explanation of a failure, optionally carrying a literal text substitution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    /// Target file; empty when unknown.
    pub file_path: PathBuf,
    pub line: Option<u32>,
    pub old_text: String,
    pub new_text: String,
    pub explanation: String,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    pub source: DiagnosisSource,
}

impl Diagnosis {
    /// Informational diagnosis with no substitution attached.
    pub fn informational(
        source: DiagnosisSource,
        explanation: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            file_path: PathBuf::new(),
            line: None,
            old_text: String::new(),
            new_text: String::new(),
            explanation: explanation.into(),
            confidence: clamp_confidence(confidence),
            source,
        }
    }

    /// Diagnosis that replaces `old_text` with `new_text` in `file_path`.
    pub fn substitution(
        source: DiagnosisSource,
        file_path: impl Into<PathBuf>,
        old_text: impl Into<String>,
        new_text: impl Into<String>,
        explanation: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line: None,
            old_text: old_text.into(),
            new_text: new_text.into(),
            explanation: explanation.into(),
            confidence: clamp_confidence(confidence),
            source,
        }
    }

    pub fn at(mut self, file_path: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file_path = file_path.into();
        self.line = line;
        self
    }

    /// True when the diagnosis names a file and the text to replace in it.
    pub fn has_substitution(&self) -> bool {
        !self.file_path.as_os_str().is_empty() && !self.old_text.is_empty()
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Sort by descending confidence; ties keep their original order.
pub fn sort_by_confidence(diagnoses: &mut [Diagnosis]) {
    diagnoses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}
