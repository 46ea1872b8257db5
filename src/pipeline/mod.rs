pub mod confirm;
pub mod controller;
pub mod report;
pub mod state;

pub use confirm::{AutoConfirm, ConfirmationChoice, ConfirmationRequest, Confirmer, TerminalConfirm};
pub use controller::Pipeline;
pub use report::{ProjectStatus, RunReport};
pub use state::{PipelineStage, PipelineState, TestSummary};
