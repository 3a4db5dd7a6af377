mod execution;
mod record;
mod runbook;
mod step;

pub use execution::{ExecutionState, OverallStatus, StepExecution, StepExecutionStatus};
pub use record::{RunbookExecutionRecord, StepSnapshot};
pub use runbook::{Runbook, RunbookStatus, StepPatch};
pub use step::{AutomationSpec, RunbookStep, StepStatus, StepVerdict, VerdictStatus};
