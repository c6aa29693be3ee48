//! Tool confirmation and execution

pub mod batch;
pub mod confirmation;

pub use batch::{
    BatchExecutionResult, CancelHandle, CancelSignal, ExecutionEntry, ExecutionStatus,
    ToolExecutor, cancellation_pair, execute_approved_tools, execute_tool, execute_tools_parallel,
};
pub use confirmation::{
    ConfirmationEntry, ConfirmationState, ConfirmationStateMachine, StateError, ToolConfirmation,
};
