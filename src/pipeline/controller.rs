use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::debug::{DebugLoop, DebugState, FailureClassifier, RepairApplier};
use crate::error::{AppError, Result};
use crate::pipeline::confirm::{
    AutoConfirm, ConfirmationChoice, ConfirmationRequest, Confirmer, TerminalConfirm,
};
use crate::pipeline::report::ProjectStatus;
use crate::pipeline::state::{PipelineStage, PipelineState, TestSummary};
use crate::project::{
    EnvironmentAnalyzer, Feature, FsAnalyzer, KeywordSpecParser, ProjectSpec, Scaffolder, SpecParser,
    TemplateScaffolder,
};
use crate::runner::outcome::{truncate_chars, TestOutcome, TestStatus};
use crate::runner::TestExecutor;
use crate::suggest::{ClaudeClient, SuggestionGenerator};
use crate::verify::{self, VerificationReport};

/// Drives one project from description to a verified directory.
///
/// Collaborators are injectable; [`Pipeline::new`] wires the defaults.
pub struct Pipeline {
    config: AppConfig,
    parser: Arc<dyn SpecParser>,
    scaffolder: Arc<dyn Scaffolder>,
    analyzer: Arc<dyn EnvironmentAnalyzer>,
    confirmer: Arc<dyn Confirmer>,
    executor: TestExecutor,
    classifier: FailureClassifier,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let confirmer: Arc<dyn Confirmer> = if config.pipeline.interactive {
            Arc::new(TerminalConfirm)
        } else {
            Arc::new(AutoConfirm)
        };

        let mut classifier = FailureClassifier::new(&config.debug);
        if let Some(client) = ClaudeClient::from_config(&config.suggestions) {
            tracing::info!(model = client.model(), "Suggestion generator enabled");
            classifier = classifier.with_generator(Arc::new(client));
        }

        Self {
            executor: TestExecutor::new(config.runner.clone()),
            classifier,
            parser: Arc::new(KeywordSpecParser),
            scaffolder: Arc::new(TemplateScaffolder),
            analyzer: Arc::new(FsAnalyzer),
            confirmer,
            config,
        }
    }

    pub fn with_spec_parser(mut self, parser: Arc<dyn SpecParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_scaffolder(mut self, scaffolder: Arc<dyn Scaffolder>) -> Self {
        self.scaffolder = scaffolder;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn EnvironmentAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_suggestion_generator(mut self, generator: Arc<dyn SuggestionGenerator>) -> Self {
        self.classifier = FailureClassifier::new(&self.config.debug).with_generator(generator);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.pipeline.output_dir
    }

    /// Run every stage for `description`. Always returns a terminal state;
    /// failures are recorded in it, never propagated.
    pub async fn generate_project(&self, description: &str) -> PipelineState {
        let mut state = PipelineState::new();

        if let Err(e) = self.run_stages(description, &mut state).await {
            tracing::error!(stage = %state.stage(), error = %e, "Pipeline failed");
            state.fail(e.to_string());
        }

        tracing::info!(
            project = %state.project_name,
            stage = %state.stage(),
            iterations = state.iterations,
            errors = state.errors.len(),
            "Pipeline finished"
        );
        state
    }

    async fn run_stages(&self, description: &str, state: &mut PipelineState) -> Result<()> {
        tracing::info!(stage = %PipelineStage::Input, "Parsing project specification");
        let spec = guarded("specification parser", || self.parser.parse(description))?;
        state.project_name = spec.name.clone();
        state.project_dir = self.config.pipeline.output_dir.join(&spec.name);

        let request = confirmation_request(&spec, &state.project_dir);
        let choice = guarded("confirmation", || self.confirmer.confirm(&request))?;
        if choice == ConfirmationChoice::Cancel {
            tracing::info!(project = %spec.name, "Project creation cancelled");
            state.fail("User cancelled project creation");
            return Ok(());
        }

        enter(state, PipelineStage::Scaffold, "Scaffolding project")?;
        let files = guarded("scaffolder", || self.scaffolder.scaffold(&spec))?;

        enter(state, PipelineStage::Generate, "Writing project files")?;
        if state.project_dir.exists() {
            tracing::warn!(dir = %state.project_dir.display(), "Project directory already exists, files will be overwritten");
        }
        std::fs::create_dir_all(&state.project_dir)?;
        let project_dir = state.project_dir.clone();
        state.generated_files = guarded("scaffolder", || self.scaffolder.write(&files, &project_dir))?;
        tracing::info!(files = state.generated_files.len(), "Project files written");

        enter(state, PipelineStage::Test, "Running tests")?;
        let outcome = self.executor.run_tests(&project_dir, None).await;
        tracing::info!(status = %outcome.status, duration_ms = outcome.duration.as_millis() as u64, "Test run finished");
        state.test_results = self.summarize(&outcome);

        if !outcome.passed() {
            enter(state, PipelineStage::Debug, "Tests did not pass, entering debug loop")?;
            let report = DebugLoop::new(&self.executor, &self.classifier, &self.config.debug)
                .with_applier(RepairApplier::confined_to(&project_dir))
                .run(&project_dir)
                .await;
            state.iterations = report.iterations;

            match report.state {
                DebugState::Succeeded => {
                    state.test_results = self.summarize(&report.last_outcome);
                    state.test_results.status = Some(TestStatus::Passed);
                }
                DebugState::Blocked { reason } => {
                    state.record_error(format!("Debug loop blocked: {reason}"));
                }
                DebugState::Exhausted => {
                    state.record_error(format!(
                        "Tests still failing after {} debug iterations",
                        report.iterations
                    ));
                }
            }
        }

        enter(state, PipelineStage::Verify, "Verifying project")?;
        let verification = verify::verify(&self.executor, &project_dir).await;
        for issue in &verification.issues {
            if !state.errors.contains(issue) {
                state.errors.push(issue.clone());
            }
        }

        let terminal = if state.errors.is_empty() || verification.tests_pass == Some(true) {
            PipelineStage::Complete
        } else {
            PipelineStage::Failed
        };
        state.advance(terminal)
    }

    fn summarize(&self, outcome: &TestOutcome) -> TestSummary {
        let output = if outcome.stdout.trim().is_empty() {
            &outcome.stderr
        } else {
            &outcome.stdout
        };
        TestSummary {
            status: Some(outcome.status),
            output: truncate_chars(output, self.config.pipeline.output_preview_chars),
            details: outcome.details.clone(),
        }
    }

    /// Names of previously generated projects, sorted.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        let dir = self.output_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Verification plus environment analysis of a generated project.
    pub async fn project_status(&self, name: &str) -> ProjectStatus {
        let Some(project_dir) = self.project_path(name) else {
            return ProjectStatus {
                name: name.to_string(),
                verification: VerificationReport::not_found(&self.output_dir().join(name)),
                environment: None,
            };
        };

        let verification = verify::verify(&self.executor, &project_dir).await;
        let environment = match guarded("environment analyzer", || self.analyzer.analyze(&project_dir)) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Environment analysis failed");
                None
            }
        };

        ProjectStatus {
            name: name.to_string(),
            verification,
            environment,
        }
    }

    /// `None` unless `name` is a single path component naming an existing project.
    fn project_path(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(std::path::Component::Normal(_)), None) => {}
            _ => return None,
        }
        let dir = self.output_dir().join(name);
        dir.is_dir().then_some(dir)
    }
}

fn enter(state: &mut PipelineState, stage: PipelineStage, message: &str) -> Result<()> {
    state.advance(stage)?;
    tracing::info!(stage = %stage, "{message}");
    Ok(())
}

fn confirmation_request(spec: &ProjectSpec, project_dir: &Path) -> ConfirmationRequest {
    let features = spec
        .features
        .iter()
        .map(Feature::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    ConfirmationRequest::new(
        "create_project",
        format!("Create project '{}' in {}?", spec.name, project_dir.display()),
    )
    .detail("name", &spec.name)
    .detail("language", spec.language.as_str())
    .detail("type", spec.kind.as_str())
    .detail("features", features)
}

/// Run a synchronous collaborator, turning a panic into an error.
fn guarded<T>(what: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(AppError::from_panic(what, payload.as_ref())),
    }
}
