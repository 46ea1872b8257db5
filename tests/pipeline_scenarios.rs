use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use projforge::config::{AppConfig, DebugConfig, RunnerConfig};
use projforge::debug::{DebugLoop, DebugState, FailureClassifier};
use projforge::error::Result;
use projforge::pipeline::{Pipeline, PipelineStage, RunReport};
use projforge::project::{
    Feature, GeneratedFile, Language, ProjectKind, ProjectSpec, Scaffolder, SpecParser,
};
use projforge::runner::{TestExecutor, TestStatus};
use projforge::suggest::{ErrorContext, SuggestionGenerator};
use projforge::verify;

const PASSING_TEST: &str = "\
def test_addition():
    assert 1 + 1 == 2


if __name__ == \"__main__\":
    test_addition()
";

const UNDEFINED_NAME_TEST: &str = "\
print(foo)


def test_addition():
    assert 1 + 1 == 2


if __name__ == \"__main__\":
    test_addition()
";

const SLOW_TEST: &str = "\
import time

time.sleep(30)


def test_addition():
    assert True
";

fn has_python() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

struct FixedSpec;

impl SpecParser for FixedSpec {
    fn parse(&self, text: &str) -> Result<ProjectSpec> {
        Ok(ProjectSpec {
            name: "scenario".to_string(),
            description: text.to_string(),
            language: Language::Python,
            kind: ProjectKind::Cli,
            features: vec![Feature::Testing],
            dependencies: Vec::new(),
        })
    }
}

/// Writes a README, a pyproject and a single test file with the given body.
struct OneTestScaffolder {
    test_body: &'static str,
}

impl Scaffolder for OneTestScaffolder {
    fn scaffold(&self, _spec: &ProjectSpec) -> Result<Vec<GeneratedFile>> {
        let file = |path: &str, content: &str| GeneratedFile {
            path: PathBuf::from(path),
            content: content.to_string(),
            executable: false,
        };
        Ok(vec![
            file("README.md", "# scenario\n"),
            file("pyproject.toml", "[project]\nname = \"scenario\"\n"),
            file("tests/test_app.py", self.test_body),
        ])
    }

    fn write(&self, files: &[GeneratedFile], target_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for f in files {
            let path = target_dir.join(&f.path);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(&path, &f.content)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Always proposes quoting the undefined name.
struct QuoteFix;

#[async_trait]
impl SuggestionGenerator for QuoteFix {
    async fn analyze_error(&self, _error_text: &str, _context: &ErrorContext) -> Result<String> {
        Ok("File: tests/test_app.py\n```old\nprint(foo)\n```\n```new\nprint('foo')\n```\nQuote the literal.".to_string())
    }
}

fn config(out: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.output_dir = out.to_path_buf();
    config.runner = RunnerConfig {
        suite_timeout_secs: 30,
        file_timeout_secs: 30,
        ..RunnerConfig::default()
    };
    config
}

fn pipeline(config: AppConfig, test_body: &'static str) -> Pipeline {
    Pipeline::new(config)
        .with_spec_parser(Arc::new(FixedSpec))
        .with_scaffolder(Arc::new(OneTestScaffolder { test_body }))
}

#[tokio::test]
async fn test_passing_project_skips_debug() {
    if !has_python() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let state = pipeline(config(tmp.path()), PASSING_TEST)
        .generate_project("a passing project")
        .await;

    assert_eq!(state.stage(), PipelineStage::Complete, "errors: {:?}", state.errors);
    assert_eq!(state.iterations, 0);
    assert_eq!(state.test_results.status, Some(TestStatus::Passed));
    assert_eq!(state.generated_files.len(), 3);
    assert!(state.completed_at().is_some());
    assert!(RunReport::from_state(&state).success);
}

#[tokio::test]
async fn test_undefined_name_blocks_and_fails() {
    if !has_python() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let state = pipeline(config(tmp.path()), UNDEFINED_NAME_TEST)
        .generate_project("a broken project")
        .await;

    assert_eq!(state.stage(), PipelineStage::Failed);
    assert_eq!(state.iterations, 1);
    assert!(!state.errors.is_empty());
    assert!(state.errors.iter().any(|e| e.starts_with("Debug loop blocked")));
    assert_ne!(state.test_results.status, Some(TestStatus::Passed));

    let test_file = tmp.path().join("scenario/tests/test_app.py");
    assert_eq!(std::fs::read_to_string(test_file).unwrap(), UNDEFINED_NAME_TEST);
}

#[tokio::test]
async fn test_low_confidence_suggestion_is_never_applied() {
    if !has_python() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let state = pipeline(config(tmp.path()), UNDEFINED_NAME_TEST)
        .with_suggestion_generator(Arc::new(QuoteFix))
        .generate_project("a broken project")
        .await;

    assert_eq!(state.stage(), PipelineStage::Failed);
    assert_eq!(state.iterations, 1);
    let test_file = tmp.path().join("scenario/tests/test_app.py");
    assert_eq!(std::fs::read(test_file).unwrap(), UNDEFINED_NAME_TEST.as_bytes());
}

#[tokio::test]
async fn test_confident_suggestion_repairs_and_stays_green() {
    if !has_python() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path());
    config.debug.suggestion_confidence = 0.9;
    let runner_config = config.runner.clone();

    let state = pipeline(config, UNDEFINED_NAME_TEST)
        .with_suggestion_generator(Arc::new(QuoteFix))
        .generate_project("a broken project")
        .await;

    assert_eq!(state.stage(), PipelineStage::Complete, "errors: {:?}", state.errors);
    assert_eq!(state.iterations, 2);
    assert_eq!(state.test_results.status, Some(TestStatus::Passed));

    // A further run with no mutation in between still passes.
    let project_dir = tmp.path().join("scenario");
    let rerun = TestExecutor::new(runner_config).run_tests(&project_dir, None).await;
    assert_eq!(rerun.status, TestStatus::Passed);
}

#[tokio::test]
async fn test_verification_of_empty_path() {
    let executor = TestExecutor::new(RunnerConfig::default());
    let report = verify::verify(&executor, Path::new("")).await;

    assert!(!report.exists);
    assert!(!report.has_readme);
    assert!(!report.has_config);
    assert!(!report.has_tests);
    assert!(report.tests_pass.is_none());
    assert_eq!(report.issues.len(), 1);
}

#[tokio::test]
async fn test_timeout_blocks_without_repair() {
    if !has_python() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("tests")).unwrap();
    let test_file = tmp.path().join("tests/test_app.py");
    std::fs::write(&test_file, SLOW_TEST).unwrap();

    let executor = TestExecutor::new(RunnerConfig {
        suite_timeout_secs: 1,
        file_timeout_secs: 1,
        kill_grace_ms: 100,
        ..RunnerConfig::default()
    });
    let debug = DebugConfig {
        suggestion_confidence: 1.0,
        ..DebugConfig::default()
    };
    let classifier = FailureClassifier::new(&debug).with_generator(Arc::new(QuoteFix));

    let started = std::time::Instant::now();
    let report = DebugLoop::new(&executor, &classifier, &debug)
        .run(tmp.path())
        .await;

    assert!(started.elapsed() < std::time::Duration::from_secs(20));
    assert!(matches!(report.state, DebugState::Blocked { .. }));
    assert_eq!(report.iterations, 1);
    assert_eq!(report.last_outcome.status, TestStatus::Error);
    assert!(report.last_outcome.stderr.contains("timed out"));
    assert!(report.applied.is_empty());
    assert_eq!(std::fs::read_to_string(&test_file).unwrap(), SLOW_TEST);
}
