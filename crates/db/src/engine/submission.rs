use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use claimflow_core::domain::new_id;
use claimflow_core::{
    ApprovalStep, ApprovalStepId, Claim, ClaimFields, ClaimId, ClaimStatus, EmployeeId,
    EventContext, EventSink, StepAction, SubmissionOutcome, SubmissionWarning, WorkflowError,
    WorkflowEvent,
};

use crate::connection::{begin_immediate, commit};
use crate::repositories::claim::{insert_claim, insert_step, update_claim_status};
use crate::repositories::workflow::fetch_definition;
use crate::repositories::{is_foreign_key_violation, RepositoryError};
use crate::DbPool;

/// Creates claims and materializes their approval chains.
pub struct ClaimSubmitter {
    pool: DbPool,
    events: Arc<dyn EventSink>,
}

impl ClaimSubmitter {
    pub fn new(pool: DbPool, events: Arc<dyn EventSink>) -> Self {
        Self { pool, events }
    }

    /// Validates `fields`, then in one transaction inserts the claim as
    /// pending and one pending step per approver of the employee's workflow.
    /// Without a workflow the claim is parked as a draft and a warning is
    /// returned instead of an error.
    pub async fn submit(
        &self,
        context: &EventContext,
        employee_id: &EmployeeId,
        fields: &ClaimFields,
    ) -> Result<SubmissionOutcome, WorkflowError> {
        let valid = fields.validate().map_err(WorkflowError::InvalidClaimFields)?;

        let claim = Claim {
            id: ClaimId(new_id("CLM")),
            employee_id: employee_id.clone(),
            description: valid.description,
            category: valid.category,
            amount: valid.amount,
            currency: valid.currency,
            receipt_ref: valid.receipt_ref,
            remarks: valid.remarks,
            status: ClaimStatus::Pending,
            submitted_at: Utc::now().trunc_subsecs(6),
        };

        let mut tx = begin_immediate(&self.pool).await?;
        let result = submit_in_tx(&mut tx, claim).await;
        let (outcome, first_step) = match commit(tx, result).await {
            Ok(committed) => committed,
            Err(error) => {
                warn!(
                    event_name = "claim.submission.failed",
                    correlation_id = %context.correlation_id,
                    employee_id = %employee_id,
                    error_class = error.class(),
                    error = %error,
                    "claim submission rolled back"
                );
                return Err(error);
            }
        };

        match (&outcome.warning, first_step) {
            (Some(_), _) => {
                warn!(
                    event_name = "claim.parked_as_draft",
                    correlation_id = %context.correlation_id,
                    claim_id = %outcome.claim.id,
                    employee_id = %employee_id,
                    "no workflow definition; claim kept as draft"
                );
                self.events.emit(context.envelope(WorkflowEvent::ClaimParkedAsDraft {
                    claim_id: outcome.claim.id.clone(),
                    employee_id: employee_id.clone(),
                }));
            }
            (None, Some(step)) => {
                info!(
                    event_name = "claim.submitted",
                    correlation_id = %context.correlation_id,
                    claim_id = %outcome.claim.id,
                    employee_id = %employee_id,
                    steps = outcome.approval_steps_created,
                    "claim entered approval"
                );
                self.events.emit(context.envelope(WorkflowEvent::StepBecameActionable {
                    claim_id: step.claim_id,
                    step_id: step.id,
                    approver_id: step.approver_id,
                    step_order: step.step_order,
                }));
            }
            (None, None) => {}
        }

        Ok(outcome)
    }
}

async fn submit_in_tx(
    conn: &mut SqliteConnection,
    mut claim: Claim,
) -> Result<(SubmissionOutcome, Option<ApprovalStep>), WorkflowError> {
    insert_claim(conn, &claim).await.map_err(|error| {
        if is_foreign_key_violation(&error) {
            WorkflowError::EmployeeNotFound(claim.employee_id.clone())
        } else {
            RepositoryError::from(error).into()
        }
    })?;

    let Some(definition) = fetch_definition(conn, &claim.employee_id).await? else {
        park_as_draft(conn, &mut claim).await?;
        return Ok((
            SubmissionOutcome {
                claim,
                approval_steps_created: 0,
                warning: Some(SubmissionWarning::NoWorkflowDefinition),
            },
            None,
        ));
    };

    let mut first_step = None;
    let mut created = 0u32;
    for (step_order, approver) in definition.approvers.numbered() {
        let step = ApprovalStep {
            id: ApprovalStepId(new_id("APS")),
            claim_id: claim.id.clone(),
            step_order,
            approver_id: approver.clone(),
            action: StepAction::Pending,
            action_date: None,
            remarks: None,
        };
        insert_step(conn, &step).await.map_err(|error| {
            if is_foreign_key_violation(&error) {
                WorkflowError::ApproverReferenceInvalid(approver.clone())
            } else {
                RepositoryError::from(error).into()
            }
        })?;

        created += 1;
        if first_step.is_none() {
            first_step = Some(step);
        }
    }

    Ok((SubmissionOutcome { claim, approval_steps_created: created, warning: None }, first_step))
}

async fn park_as_draft(conn: &mut SqliteConnection, claim: &mut Claim) -> Result<(), WorkflowError> {
    let now: DateTime<Utc> = Utc::now();
    if !update_claim_status(conn, &claim.id, ClaimStatus::Pending, ClaimStatus::Draft, now).await? {
        return Err(WorkflowError::Store(format!("claim {} vanished before parking", claim.id)));
    }
    claim.status = ClaimStatus::Draft;
    Ok(())
}
