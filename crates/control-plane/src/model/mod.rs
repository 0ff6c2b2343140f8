//! Domain model shared by the scheduler, controller, querier and result engine.

mod execution;
mod signature;
mod status;

pub use execution::{
    Execution, ExecutionResult, NewExecution, PauseInterval, Runner, StepReport, StepResult,
    INIT_STEP_REF,
};
pub use signature::Signature;
pub use status::{ExecutionStatus, OptionalStepStatus, StepStatus};
