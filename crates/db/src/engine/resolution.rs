use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use claimflow_core::{
    ApprovalChain, ApprovalStep, ApprovalStepId, ClaimId, ClaimStatus, Decision, EmployeeId,
    EventContext, EventSink, StepResolution, WorkflowError, WorkflowEvent,
};

use crate::connection::{begin_immediate, commit};
use crate::repositories::claim::{
    fetch_steps, parse_claim_status, parse_step_order, update_claim_status,
};
use crate::repositories::{column, encode_timestamp, RepositoryError};
use crate::DbPool;

/// Records approver decisions one step at a time, strictly in step order.
pub struct StepResolver {
    pool: DbPool,
    events: Arc<dyn EventSink>,
}

struct Resolved {
    resolution: StepResolution,
    next_step: Option<ApprovalStep>,
}

impl StepResolver {
    pub fn new(pool: DbPool, events: Arc<dyn EventSink>) -> Self {
        Self { pool, events }
    }

    /// Applies `decision` to `step_id` on behalf of `approver_id`.
    ///
    /// The eligibility read and both updates run under one `BEGIN IMMEDIATE`
    /// transaction, so concurrent resolutions of the same claim see each
    /// other's writes and at most one of two racers on a step succeeds.
    pub async fn resolve(
        &self,
        context: &EventContext,
        approver_id: &EmployeeId,
        step_id: &ApprovalStepId,
        decision: Decision,
        remarks: Option<String>,
    ) -> Result<StepResolution, WorkflowError> {
        let remarks = remarks.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let mut tx = begin_immediate(&self.pool).await?;
        let result = resolve_in_tx(&mut tx, approver_id, step_id, decision, remarks).await;
        let resolved = match commit(tx, result).await {
            Ok(resolved) => resolved,
            Err(error) => {
                log_rejection(context, approver_id, step_id, &error);
                return Err(error);
            }
        };

        let resolution = resolved.resolution;
        info!(
            event_name = "approval.step.resolved",
            correlation_id = %context.correlation_id,
            actor = %approver_id,
            claim_id = %resolution.claim_id,
            step_id = %resolution.step_id,
            step_order = resolution.step_order,
            action = ?resolution.action,
            claim_status = resolution.new_claim_status.as_str(),
            "approval step resolved"
        );

        if let Some(step) = resolved.next_step {
            self.events.emit(context.envelope(WorkflowEvent::StepBecameActionable {
                claim_id: step.claim_id,
                step_id: step.id,
                approver_id: step.approver_id,
                step_order: step.step_order,
            }));
        }
        if resolution.new_claim_status.is_terminal() {
            self.events.emit(context.envelope(WorkflowEvent::ClaimResolved {
                claim_id: resolution.claim_id.clone(),
                status: resolution.new_claim_status,
            }));
        }

        Ok(resolution)
    }
}

fn log_rejection(
    context: &EventContext,
    approver_id: &EmployeeId,
    step_id: &ApprovalStepId,
    error: &WorkflowError,
) {
    match error {
        WorkflowError::OutOfSequence { step_order, current_min_step } => warn!(
            event_name = "approval.step.out_of_sequence",
            correlation_id = %context.correlation_id,
            actor = %approver_id,
            step_id = %step_id,
            step_order = *step_order,
            current_min_step = *current_min_step,
            "approval attempted ahead of an earlier pending step"
        ),
        WorkflowError::Store(_) => warn!(
            event_name = "approval.step.store_failure",
            correlation_id = %context.correlation_id,
            actor = %approver_id,
            step_id = %step_id,
            error = %error,
            "approval step resolution rolled back"
        ),
        _ => info!(
            event_name = "approval.step.rejected",
            correlation_id = %context.correlation_id,
            actor = %approver_id,
            step_id = %step_id,
            error_class = error.class(),
            "approval step not resolved"
        ),
    }
}

async fn resolve_in_tx(
    conn: &mut SqliteConnection,
    approver_id: &EmployeeId,
    step_id: &ApprovalStepId,
    decision: Decision,
    remarks: Option<String>,
) -> Result<Resolved, WorkflowError> {
    let row = sqlx::query(
        "SELECT s.claim_id, s.step_order, c.status AS claim_status
         FROM approval_step s
         JOIN claim c ON c.id = s.claim_id
         WHERE s.id = ? AND s.approver_id = ? AND s.action = 'pending'",
    )
    .bind(&step_id.0)
    .bind(approver_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(RepositoryError::from)?
    .ok_or(WorkflowError::StepNotFoundOrAlreadyProcessed)?;

    let claim_id = ClaimId(column(&row, "claim_id")?);
    let step_order = parse_step_order(column(&row, "step_order")?)?;
    let claim_status: String = column(&row, "claim_status")?;
    let claim_status = parse_claim_status(&claim_status)?;

    let steps = fetch_steps(conn, &claim_id).await?;
    let mut chain = ApprovalChain::from_steps(claim_status, &steps);
    let outcome = chain.resolve(step_order, decision)?;

    let now = Utc::now().trunc_subsecs(6);
    let updated = sqlx::query(
        "UPDATE approval_step
         SET action = ?, action_date = ?, remarks = ?
         WHERE id = ? AND action = 'pending'",
    )
    .bind(decision.as_action().as_str())
    .bind(encode_timestamp(now))
    .bind(&remarks)
    .bind(&step_id.0)
    .execute(&mut *conn)
    .await
    .map_err(RepositoryError::from)?;
    if updated.rows_affected() != 1 {
        return Err(WorkflowError::StepNotFoundOrAlreadyProcessed);
    }

    if outcome.new_status != ClaimStatus::Pending
        && !update_claim_status(conn, &claim_id, ClaimStatus::Pending, outcome.new_status, now)
            .await?
    {
        return Err(WorkflowError::StepNotFoundOrAlreadyProcessed);
    }

    let next_step = outcome
        .next_step
        .and_then(|order| steps.iter().find(|step| step.step_order == order).cloned());

    Ok(Resolved {
        resolution: StepResolution {
            claim_id,
            step_id: step_id.clone(),
            step_order,
            action: decision,
            new_claim_status: outcome.new_status,
        },
        next_step,
    })
}
