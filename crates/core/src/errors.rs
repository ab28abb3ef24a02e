use serde::Serialize;
use thiserror::Error;

use crate::domain::claim::FieldViolation;
use crate::domain::employee::EmployeeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller-fixable input problems. Nothing was written.
    Validation,
    /// A referenced employee is missing or incomplete. Nothing was written.
    Referential,
    /// Expected conflicts with current state; re-query and decide again.
    Conflict,
    /// Store unavailable or transaction failure; fully rolled back.
    Infra,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid claim fields: {}", join_violations(.0))]
    InvalidClaimFields(Vec<FieldViolation>),
    #[error("invalid approver list: unknown employees {}", join_ids(.0))]
    InvalidApproverList(Vec<EmployeeId>),
    /// `additionalApproverIds` was not a list of employee id strings.
    #[error("invalid approver list: {0}")]
    MalformedApproverList(String),
    #[error("invalid action `{0}`; expected Approved or Rejected")]
    InvalidAction(String),
    #[error("employee name `{name}` matches {matches} directory entries")]
    AmbiguousEmployeeName { name: String, matches: usize },
    #[error("employee {0} not found")]
    EmployeeNotFound(EmployeeId),
    #[error("employee {0} does not have an assigned manager to act as first approver")]
    NoManagerAssigned(EmployeeId),
    #[error("approver {0} in the workflow definition no longer maps to an employee")]
    ApproverReferenceInvalid(EmployeeId),
    #[error("approval workflow already exists for employee {0}")]
    DefinitionAlreadyExists(EmployeeId),
    #[error("approval step not found, not assigned to you, or already processed")]
    StepNotFoundOrAlreadyProcessed,
    #[error("cannot process step {step_order}; step {current_min_step} must be processed first")]
    OutOfSequence { step_order: u32, current_min_step: u32 },
    #[error("store failure: {0}")]
    Store(String),
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClaimFields(_)
            | Self::InvalidApproverList(_)
            | Self::MalformedApproverList(_)
            | Self::InvalidAction(_)
            | Self::AmbiguousEmployeeName { .. } => ErrorCategory::Validation,
            Self::EmployeeNotFound(_)
            | Self::NoManagerAssigned(_)
            | Self::ApproverReferenceInvalid(_) => ErrorCategory::Referential,
            Self::DefinitionAlreadyExists(_)
            | Self::StepNotFoundOrAlreadyProcessed
            | Self::OutOfSequence { .. } => ErrorCategory::Conflict,
            Self::Store(_) => ErrorCategory::Infra,
        }
    }

    /// Stable machine-readable name, used as `error_class` on the wire.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidClaimFields(_) => "invalid_claim_fields",
            Self::InvalidApproverList(_) | Self::MalformedApproverList(_) => {
                "invalid_approver_list"
            }
            Self::InvalidAction(_) => "invalid_action",
            Self::AmbiguousEmployeeName { .. } => "ambiguous_employee_name",
            Self::EmployeeNotFound(_) => "employee_not_found",
            Self::NoManagerAssigned(_) => "no_manager_assigned",
            Self::ApproverReferenceInvalid(_) => "approver_reference_invalid",
            Self::DefinitionAlreadyExists(_) => "definition_already_exists",
            Self::StepNotFoundOrAlreadyProcessed => "step_not_found_or_already_processed",
            Self::OutOfSequence { .. } => "out_of_sequence",
            Self::Store(_) => "store_unavailable",
        }
    }

    fn details(&self) -> Vec<String> {
        match self {
            Self::InvalidClaimFields(violations) => {
                violations.iter().map(ToString::to_string).collect()
            }
            Self::InvalidApproverList(unknown) => {
                unknown.iter().map(|id| format!("unknown approver {id}")).collect()
            }
            Self::MalformedApproverList(reason) => vec![reason.clone()],
            _ => Vec::new(),
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let class = self.class();
        let details = self.details();
        match (&self, self.category()) {
            (_, ErrorCategory::Validation) => InterfaceError::BadRequest {
                class,
                message: self.to_string(),
                details,
                correlation_id,
            },
            (Self::EmployeeNotFound(_), _) | (Self::StepNotFoundOrAlreadyProcessed, _) => {
                InterfaceError::NotFound { class, message: self.to_string(), correlation_id }
            }
            (_, ErrorCategory::Referential) => {
                InterfaceError::Unprocessable { class, message: self.to_string(), correlation_id }
            }
            (_, ErrorCategory::Conflict) => {
                InterfaceError::Conflict { class, message: self.to_string(), correlation_id }
            }
            (_, ErrorCategory::Infra) => InterfaceError::ServiceUnavailable {
                class,
                message: self.to_string(),
                correlation_id,
            },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest {
        class: &'static str,
        message: String,
        details: Vec<String>,
        correlation_id: String,
    },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { class: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { class: &'static str, message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { class: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { class: &'static str, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::BadRequest { class, .. }
            | Self::NotFound { class, .. }
            | Self::Conflict { class, .. }
            | Self::Unprocessable { class, .. }
            | Self::ServiceUnavailable { class, .. } => *class,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }

    pub fn details(&self) -> &[String] {
        match self {
            Self::BadRequest { details, .. } => details,
            _ => &[],
        }
    }

    /// Text safe to show a caller. Infra failures never echo store internals.
    pub fn user_message(&self) -> String {
        match self {
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_string()
            }
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::Unprocessable { message, .. } => message.clone(),
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

fn join_ids(ids: &[EmployeeId]) -> String {
    ids.iter().map(EmployeeId::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use crate::domain::claim::{ClaimFields, FieldViolation};
    use crate::domain::employee::EmployeeId;
    use crate::errors::{ErrorCategory, InterfaceError, WorkflowError};

    fn violations() -> Vec<FieldViolation> {
        ClaimFields::default().validate().expect_err("empty claim is invalid")
    }

    #[test]
    fn taxonomy_categories_match_error_kinds() {
        assert_eq!(WorkflowError::InvalidAction("x".into()).category(), ErrorCategory::Validation);
        assert_eq!(
            WorkflowError::NoManagerAssigned(EmployeeId::new("E1")).category(),
            ErrorCategory::Referential
        );
        assert_eq!(
            WorkflowError::OutOfSequence { step_order: 2, current_min_step: 1 }.category(),
            ErrorCategory::Conflict
        );
        assert_eq!(WorkflowError::Store("locked".into()).category(), ErrorCategory::Infra);
    }

    #[test]
    fn validation_error_maps_to_bad_request_with_every_field() {
        let interface =
            WorkflowError::InvalidClaimFields(violations()).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
        assert_eq!(interface.class(), "invalid_claim_fields");
        assert_eq!(interface.details().len(), 3);
    }

    #[test]
    fn out_of_sequence_maps_to_conflict_and_names_both_steps() {
        let interface = WorkflowError::OutOfSequence { step_order: 3, current_min_step: 1 }
            .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert!(interface.user_message().contains("step 3"));
        assert!(interface.user_message().contains("step 1"));
    }

    #[test]
    fn missing_step_maps_to_not_found() {
        let interface = WorkflowError::StepNotFoundOrAlreadyProcessed.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::NotFound { .. }));
    }

    #[test]
    fn store_error_hides_internal_detail() {
        let interface =
            WorkflowError::Store("database is locked".into()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(!interface.user_message().contains("locked"));
    }

    #[test]
    fn referential_errors_are_unprocessable_except_missing_employee() {
        let missing = WorkflowError::EmployeeNotFound(EmployeeId::new("E9")).into_interface("r");
        let stale =
            WorkflowError::ApproverReferenceInvalid(EmployeeId::new("A1")).into_interface("r");

        assert!(matches!(missing, InterfaceError::NotFound { .. }));
        assert!(matches!(stale, InterfaceError::Unprocessable { .. }));
    }
}
