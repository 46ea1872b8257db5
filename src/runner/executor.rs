use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::config::RunnerConfig;
use crate::runner::detect::{self, FrameworkId};
use crate::runner::outcome::{TestOutcome, TestStatus};
use crate::runner::process::{CommandLine, ProcessRunner, LAUNCH_FAILURE_PREFIX};

const DIRECT_RUNNER_NAME: &str = "direct";

/// Runs a project's tests with whatever framework it uses and reports a uniform outcome.
#[derive(Debug, Clone)]
pub struct TestExecutor {
    runner: ProcessRunner,
    config: RunnerConfig,
}

impl TestExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            runner: ProcessRunner::new(config.kill_grace()),
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run the project's tests, or only `explicit_path` when given.
    ///
    /// When the selected tool turns out to be missing from the environment,
    /// each test file is executed directly instead.
    pub async fn run_tests(&self, project_dir: &Path, explicit_path: Option<&str>) -> TestOutcome {
        if !project_dir.is_dir() {
            return TestOutcome::error(
                "executor",
                format!("Project directory does not exist: {}", project_dir.display()),
            );
        }
        if let Some(path) = explicit_path {
            if !project_dir.join(path).is_file() {
                return TestOutcome::error("executor", format!("Test file not found: {path}"));
            }
        }

        let Some(detection) = detect::detect(project_dir) else {
            tracing::info!(dir = %project_dir.display(), "No framework detected, running test files directly");
            return self.run_direct(project_dir, explicit_path).await;
        };

        tracing::info!(
            framework = %detection.framework,
            reason = %detection.reason,
            "Running tests"
        );

        let outcome = self
            .run_framework(detection.framework, project_dir, explicit_path)
            .await;

        if tool_unavailable(detection.framework, &outcome) {
            tracing::warn!(
                framework = %detection.framework,
                "Test tool unavailable, falling back to direct invocation"
            );
            return self.run_direct(project_dir, explicit_path).await;
        }

        outcome
    }

    async fn run_framework(
        &self,
        framework: FrameworkId,
        project_dir: &Path,
        explicit_path: Option<&str>,
    ) -> TestOutcome {
        let command = self.framework_command(framework, explicit_path);
        let outcome = self
            .runner
            .run(
                framework.as_str(),
                &command,
                project_dir,
                self.framework_timeout(explicit_path),
            )
            .await;

        match framework {
            FrameworkId::Pytest => {
                let details = parse_pytest_summary(&outcome.stdout);
                outcome.with_details(details)
            }
            _ => outcome,
        }
    }

    /// A single requested file gets the per-file budget, a full suite the suite budget.
    fn framework_timeout(&self, explicit_path: Option<&str>) -> Duration {
        match explicit_path {
            Some(_) => self.config.file_timeout(),
            None => self.config.suite_timeout(),
        }
    }

    fn framework_command(&self, framework: FrameworkId, explicit_path: Option<&str>) -> CommandLine {
        match framework {
            FrameworkId::Pytest => CommandLine::new(&self.config.python)
                .args(["-m", "pytest", "-v"])
                .arg(explicit_path.unwrap_or("tests/")),
            FrameworkId::Unittest => {
                let base = CommandLine::new(&self.config.python).args(["-m", "unittest", "-v"]);
                match explicit_path {
                    Some(path) => base.arg(path),
                    None => base.args(["discover", "-s", "tests"]),
                }
            }
            FrameworkId::Jest => {
                let base = CommandLine::new("npx").args(["jest", "--verbose"]);
                match explicit_path {
                    Some(path) => base.arg(path),
                    None => base,
                }
            }
            FrameworkId::Mocha => CommandLine::new("npx")
                .arg("mocha")
                .arg(explicit_path.unwrap_or("tests/")),
        }
    }

    /// Execute each conventional test file as its own process and aggregate.
    async fn run_direct(&self, project_dir: &Path, explicit_path: Option<&str>) -> TestOutcome {
        let files = match explicit_path {
            Some(path) => vec![project_dir.join(path)],
            None => {
                if !project_dir.join("tests").is_dir() {
                    return TestOutcome::skipped(DIRECT_RUNNER_NAME, "No tests directory found");
                }
                discover_test_files(project_dir)
            }
        };

        if files.is_empty() {
            return TestOutcome::skipped(DIRECT_RUNNER_NAME, "No test files found");
        }

        let mut stdout_sections = Vec::new();
        let mut first_failure: Option<String> = None;
        let mut any_error = false;
        let mut any_failed = false;
        let mut total = Duration::ZERO;
        let mut details: BTreeMap<String, u64> = BTreeMap::new();
        let mut executed = 0usize;

        for file in &files {
            let rel_path = file
                .strip_prefix(project_dir)
                .unwrap_or(file)
                .display()
                .to_string();

            let Some(command) = self.direct_command(file) else {
                continue;
            };

            let outcome = self
                .runner
                .run(&rel_path, &command, project_dir, self.config.file_timeout())
                .await;
            total += outcome.duration;
            executed += 1;

            tracing::debug!(file = %rel_path, status = %outcome.status, "Direct test file finished");

            stdout_sections.push(format!("=== {rel_path} ===\n{}", outcome.stdout));

            match outcome.status {
                TestStatus::Passed => *details.entry("passed".to_string()).or_default() += 1,
                TestStatus::Failed | TestStatus::Skipped => {
                    any_failed = true;
                    *details.entry("failed".to_string()).or_default() += 1;
                }
                TestStatus::Error => {
                    any_error = true;
                    *details.entry("errors".to_string()).or_default() += 1;
                }
            }

            if outcome.status != TestStatus::Passed && first_failure.is_none() {
                first_failure = Some(format!("{rel_path}:\n{}", outcome.stderr));
            }
        }

        if executed == 0 {
            return TestOutcome::skipped(DIRECT_RUNNER_NAME, "No runnable test files found");
        }

        let status = if any_error {
            TestStatus::Error
        } else if any_failed {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };

        TestOutcome::new(DIRECT_RUNNER_NAME, status)
            .with_stdout(stdout_sections.join("\n"))
            .with_stderr(first_failure.unwrap_or_default())
            .with_duration(total)
            .with_details(details)
    }

    fn direct_command(&self, file: &Path) -> Option<CommandLine> {
        let path = file.to_string_lossy().to_string();
        match file.extension().and_then(|e| e.to_str()) {
            Some("py") => Some(CommandLine::new(&self.config.python).arg(path)),
            Some("js") => Some(CommandLine::new(&self.config.node).arg(path)),
            _ => None,
        }
    }
}

/// True when `file_name` follows a test naming convention
/// (`test_*.py`, `*.test.js`).
pub fn is_test_file_name(file_name: &str) -> bool {
    (file_name.starts_with("test_") && file_name.ends_with(".py")) || file_name.ends_with(".test.js")
}

/// Conventional test files directly under `tests/`, sorted by path.
pub fn discover_test_files(project_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(project_dir.join("tests")) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_test_file_name)
        })
        .collect();
    files.sort();
    files
}

fn tool_unavailable(framework: FrameworkId, outcome: &TestOutcome) -> bool {
    if outcome.status == TestStatus::Error && outcome.stderr.starts_with(LAUNCH_FAILURE_PREFIX) {
        return true;
    }
    if outcome.status == TestStatus::Passed {
        return false;
    }
    let markers: &[&str] = match framework {
        FrameworkId::Pytest => &["No module named pytest"],
        FrameworkId::Unittest => &["No module named unittest"],
        FrameworkId::Jest => &["jest: not found", "command not found", "could not determine executable"],
        FrameworkId::Mocha => &["mocha: not found", "command not found", "could not determine executable"],
    };
    markers.iter().any(|m| outcome.mentions(m))
}

fn pytest_count_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+) (passed|failed|skipped|errors?)\b").expect("static regex is valid")
    })
}

/// Per-status counts from pytest's closing summary line.
pub fn parse_pytest_summary(output: &str) -> BTreeMap<String, u64> {
    let mut details: BTreeMap<String, u64> = ["passed", "failed", "skipped", "errors"]
        .into_iter()
        .map(|k| (k.to_string(), 0))
        .collect();

    let summary = output.lines().rev().find(|line| {
        let line = line.trim();
        line.starts_with('=') && pytest_count_regex().is_match(line)
    });

    if let Some(line) = summary {
        for caps in pytest_count_regex().captures_iter(line) {
            let count: u64 = caps[1].parse().unwrap_or(0);
            let key = match &caps[2] {
                "error" | "errors" => "errors",
                other => other,
            };
            details.insert(key.to_string(), count);
        }
    }

    details
}
