use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::state::{PipelineStage, PipelineState};
use crate::project::EnvironmentReport;
use crate::runner::outcome::truncate_chars;
use crate::verify::VerificationReport;

const SUMMARY_MAX_ERRORS: usize = 3;
const SUMMARY_ERROR_CHARS: usize = 50;

/// Final result of a run, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub project_name: String,
    pub project_dir: PathBuf,
    pub stage: PipelineStage,
    pub files_generated: usize,
    pub iterations: u32,
    pub test_status: Option<String>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: String,
}

impl RunReport {
    pub fn from_state(state: &PipelineState) -> Self {
        Self {
            success: state.stage() == PipelineStage::Complete,
            project_name: state.project_name.clone(),
            project_dir: state.project_dir.clone(),
            stage: state.stage(),
            files_generated: state.generated_files.len(),
            iterations: state.iterations,
            test_status: state.test_results.status.map(|s| s.to_string()),
            errors: state.errors.clone(),
            started_at: state.started_at,
            completed_at: state.completed_at(),
            summary: summary(state),
        }
    }
}

/// Human-readable multi-line summary of a run.
pub fn summary(state: &PipelineState) -> String {
    let mut lines = vec![
        format!("Project: {}", state.project_name),
        format!("Stage: {}", state.stage()),
        format!("Directory: {}", state.project_dir.display()),
        format!("Files Generated: {}", state.generated_files.len()),
        format!("Debug Iterations: {}", state.iterations),
    ];

    if let Some(status) = state.test_results.status {
        lines.push(format!("Tests: {status}"));
    }

    if !state.errors.is_empty() {
        lines.push(format!("Issues: {}", state.errors.len()));
        for error in state.errors.iter().take(SUMMARY_MAX_ERRORS) {
            let short = truncate_chars(error, SUMMARY_ERROR_CHARS);
            if short.len() < error.len() {
                lines.push(format!("  - {short}..."));
            } else {
                lines.push(format!("  - {short}"));
            }
        }
    }

    lines.join("\n")
}

/// Answer to a status query for one generated project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub name: String,
    pub verification: VerificationReport,
    pub environment: Option<EnvironmentReport>,
}

impl ProjectStatus {
    pub fn render(&self) -> String {
        let v = &self.verification;
        let mut lines = vec![format!("Project: {}", self.name)];
        if !v.exists {
            lines.push(format!("Directory: {} (missing)", v.project_dir.display()));
        } else {
            lines.push(format!("Directory: {}", v.project_dir.display()));
            lines.push(format!("README: {}", yes_no(v.has_readme)));
            lines.push(format!("Config: {}", yes_no(v.has_config)));
            lines.push(format!("Tests: {}", yes_no(v.has_tests)));
            if let Some(pass) = v.tests_pass {
                lines.push(format!("Tests pass: {}", yes_no(pass)));
            }
        }

        if let Some(env) = &self.environment {
            lines.push(format!("Files: {}, directories: {}", env.file_count, env.dir_count));
            if !env.languages.is_empty() {
                let languages = env
                    .languages
                    .iter()
                    .map(|(name, count)| format!("{name} ({count})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("Languages: {languages}"));
            }
            for vector in &env.optimization_vectors {
                lines.push(format!("  [{}] {}", vector.priority, vector.description));
            }
        }

        if !v.issues.is_empty() {
            lines.push(format!("Issues: {}", v.issues.len()));
            lines.extend(v.issues.iter().map(|i| format!("  - {i}")));
        }
        lines.join("\n")
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
