use std::path::{Path, PathBuf};

use crate::debug::diagnosis::Diagnosis;

/// Applies the literal text substitution carried by a diagnosis.
///
/// Only the first occurrence of `old_text` is replaced. Every failure is
/// reported as `false`; the target file is left untouched in that case.
#[derive(Debug, Clone, Default)]
pub struct RepairApplier {
    root: Option<PathBuf>,
}

impl RepairApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse edits to files outside `root`.
    pub fn confined_to(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub async fn apply(&self, diagnosis: &Diagnosis) -> bool {
        if !diagnosis.has_substitution() {
            tracing::debug!("Diagnosis carries no substitution");
            return false;
        }

        let Some(path) = self.target(&diagnosis.file_path) else {
            tracing::warn!(
                file = %diagnosis.file_path.display(),
                "Repair target is missing or outside the project"
            );
            return false;
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to read repair target");
                return false;
            }
        };

        if !content.contains(&diagnosis.old_text) {
            tracing::debug!(file = %path.display(), "Text to replace not found");
            return false;
        }

        let updated = content.replacen(&diagnosis.old_text, &diagnosis.new_text, 1);
        match tokio::fs::write(&path, updated).await {
            Ok(()) => {
                tracing::info!(file = %path.display(), line = ?diagnosis.line, "Applied repair");
                true
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to write repair target");
                false
            }
        }
    }

    fn target(&self, file_path: &Path) -> Option<PathBuf> {
        let canonical = file_path.canonicalize().ok()?;
        if !canonical.is_file() {
            return None;
        }
        match &self.root {
            Some(root) => {
                let root = root.canonicalize().ok()?;
                canonical.starts_with(&root).then_some(canonical)
            }
            None => Some(canonical),
        }
    }
}
