use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::runner::executor::{discover_test_files, TestExecutor};
use crate::runner::outcome::{truncate_chars, TestStatus};

const README_FILES: &[&str] = &["README.md", "README.rst", "README"];
const CONFIG_FILES: &[&str] = &["pyproject.toml", "setup.py", "setup.cfg", "package.json"];
const OUTPUT_PREVIEW_CHARS: usize = 500;
const FAILURE_EXCERPT_CHARS: usize = 200;

/// Post-hoc audit of a generated project directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub project_dir: PathBuf,
    pub exists: bool,
    pub has_readme: bool,
    pub has_config: bool,
    pub has_tests: bool,
    /// `None` when there were no tests to run.
    pub tests_pass: Option<bool>,
    pub test_status: Option<TestStatus>,
    pub test_output: Option<String>,
    pub issues: Vec<String>,
}

impl VerificationReport {
    fn missing(project_dir: &Path, issue: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            issues: vec![issue.into()],
            ..Self::default()
        }
    }

    /// Unknown project; carries a single issue.
    pub fn not_found(project_dir: &Path) -> Self {
        Self::missing(project_dir, "Project not found")
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check artifacts and re-run the tests when there are any.
pub async fn verify(executor: &TestExecutor, project_dir: &Path) -> VerificationReport {
    if project_dir.as_os_str().is_empty() || !project_dir.is_dir() {
        return VerificationReport::missing(project_dir, "Project directory does not exist");
    }

    let mut report = VerificationReport {
        project_dir: project_dir.to_path_buf(),
        exists: true,
        has_readme: any_file(project_dir, README_FILES),
        has_config: any_file(project_dir, CONFIG_FILES),
        has_tests: !discover_test_files(project_dir).is_empty(),
        ..VerificationReport::default()
    };

    if !report.has_readme {
        report.issues.push("Missing README.md".to_string());
    }
    if !report.has_config {
        report
            .issues
            .push(format!("Missing project configuration ({})", CONFIG_FILES.join(", ")));
    }

    if report.has_tests {
        let outcome = executor.run_tests(project_dir, None).await;
        let passed = outcome.passed();
        report.tests_pass = Some(passed);
        report.test_status = Some(outcome.status);
        report.test_output = Some(truncate_chars(&outcome.stdout, OUTPUT_PREVIEW_CHARS));
        if !passed {
            report.issues.push(format!(
                "Tests failed: {}",
                truncate_chars(outcome.error_text(), FAILURE_EXCERPT_CHARS)
            ));
        }
    } else {
        report.issues.push("No tests found".to_string());
    }

    tracing::info!(
        dir = %project_dir.display(),
        tests_pass = ?report.tests_pass,
        issues = report.issues.len(),
        "Verification finished"
    );

    report
}

fn any_file(dir: &Path, names: &[&str]) -> bool {
    names.iter().any(|name| dir.join(name).is_file())
}
