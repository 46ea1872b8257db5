pub mod classifier;
pub mod diagnosis;
pub mod engine;
pub mod repair;

pub use classifier::FailureClassifier;
pub use diagnosis::{Diagnosis, DiagnosisSource};
pub use engine::{DebugLoop, DebugReport, DebugState};
pub use repair::RepairApplier;
