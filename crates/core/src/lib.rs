pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;

pub use chrono;
pub use rust_decimal;

pub use approvals::{check_sequence, next_claim_status, ApprovalChain, ChainOutcome};
pub use domain::approval::{
    ActionableStep, ApprovalStep, ApprovalStepId, Decision, StepAction, StepResolution,
};
pub use domain::claim::{
    AmountInput, Claim, ClaimFields, ClaimId, ClaimStatus, FieldViolation, SubmissionOutcome,
    SubmissionWarning, ValidClaimFields,
};
pub use domain::employee::{Employee, EmployeeId, Principal, Role};
pub use domain::workflow::{ApproverSequence, WorkflowDefinition, WorkflowId};
pub use errors::{ErrorCategory, InterfaceError, WorkflowError};
pub use events::{
    EventContext, EventEnvelope, EventSink, InMemoryEventSink, TracingEventSink, WorkflowEvent,
};
