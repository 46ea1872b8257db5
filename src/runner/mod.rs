pub mod detect;
pub mod executor;
pub mod outcome;
pub mod process;

pub use detect::{detect, Detection, FrameworkId};
pub use executor::TestExecutor;
pub use outcome::{TestOutcome, TestStatus};
pub use process::{CommandLine, ProcessRunner};
