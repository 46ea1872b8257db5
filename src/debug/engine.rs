use std::path::Path;

use serde::Serialize;

use crate::config::DebugConfig;
use crate::debug::classifier::FailureClassifier;
use crate::debug::diagnosis::{sort_by_confidence, Diagnosis};
use crate::debug::repair::RepairApplier;
use crate::runner::executor::TestExecutor;
use crate::runner::outcome::{TestOutcome, TestStatus};

/// Terminal state of a debug loop run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DebugState {
    /// Tests pass.
    Succeeded,
    /// Tests still fail after the iteration budget was spent.
    Exhausted,
    /// Nothing more can be done automatically.
    Blocked { reason: String },
}

impl DebugState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
            Self::Blocked { .. } => "blocked",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DebugReport {
    pub state: DebugState,
    /// Loop iterations entered, including the one that terminated.
    pub iterations: u32,
    pub last_outcome: TestOutcome,
    /// Diagnoses whose substitution was written to disk, in order.
    pub applied: Vec<Diagnosis>,
}

/// Test, classify, repair; repeat until green, stuck, or out of budget.
pub struct DebugLoop<'a> {
    executor: &'a TestExecutor,
    classifier: &'a FailureClassifier,
    applier: RepairApplier,
    max_iterations: u32,
    confidence_threshold: f64,
}

impl<'a> DebugLoop<'a> {
    pub fn new(
        executor: &'a TestExecutor,
        classifier: &'a FailureClassifier,
        config: &DebugConfig,
    ) -> Self {
        Self {
            executor,
            classifier,
            applier: RepairApplier::new(),
            max_iterations: config.max_iterations,
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn with_applier(mut self, applier: RepairApplier) -> Self {
        self.applier = applier;
        self
    }

    pub async fn run(&self, project_dir: &Path) -> DebugReport {
        let mut applied = Vec::new();
        let mut last_outcome = TestOutcome::skipped("debug", "Debug loop did not run");

        for iteration in 1..=self.max_iterations {
            tracing::info!(iteration, max = self.max_iterations, "Debug iteration");

            let outcome = self.executor.run_tests(project_dir, None).await;
            let finish = |state: DebugState, outcome: TestOutcome, applied: Vec<Diagnosis>| {
                tracing::info!(iteration, state = state.as_str(), "Debug loop finished");
                DebugReport {
                    state,
                    iterations: iteration,
                    last_outcome: outcome,
                    applied,
                }
            };

            match outcome.status {
                TestStatus::Passed => return finish(DebugState::Succeeded, outcome, applied),
                TestStatus::Error => {
                    let reason = format!(
                        "Test infrastructure error: {}",
                        first_line(outcome.error_text())
                    );
                    return finish(DebugState::Blocked { reason }, outcome, applied);
                }
                TestStatus::Failed | TestStatus::Skipped => {}
            }

            let mut diagnoses = self.classifier.classify(&outcome, project_dir).await;
            if diagnoses.is_empty() {
                let reason = "No diagnosis found for the failure".to_string();
                return finish(DebugState::Blocked { reason }, outcome, applied);
            }

            sort_by_confidence(&mut diagnoses);
            for d in &diagnoses {
                tracing::debug!(
                    confidence = d.confidence,
                    source = ?d.source,
                    explanation = %d.explanation,
                    "Diagnosis"
                );
            }

            match self.apply_first_eligible(&diagnoses).await {
                Some(d) => applied.push(d),
                None => {
                    let best = &diagnoses[0];
                    let reason = format!(
                        "No diagnosis met the confidence threshold {:.2} with an applicable fix (best: {} at {:.2})",
                        self.confidence_threshold, best.explanation, best.confidence
                    );
                    return finish(DebugState::Blocked { reason }, outcome, applied);
                }
            }

            last_outcome = outcome;
        }

        tracing::warn!(iterations = self.max_iterations, "Debug iteration budget exhausted");
        DebugReport {
            state: DebugState::Exhausted,
            iterations: self.max_iterations,
            last_outcome,
            applied,
        }
    }

    async fn apply_first_eligible(&self, sorted: &[Diagnosis]) -> Option<Diagnosis> {
        for d in sorted {
            if d.confidence < self.confidence_threshold {
                // Sorted descending, nothing further qualifies.
                break;
            }
            if self.applier.apply(d).await {
                return Some(d.clone());
            }
        }
        None
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}
