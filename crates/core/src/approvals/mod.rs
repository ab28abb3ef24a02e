//! Sequential approval rules.
//!
//! A claim's steps are resolved strictly in `step_order`. Only the pending
//! step with the smallest order is eligible; one rejection anywhere ends the
//! chain as `Rejected`, and the chain is `Approved` once nothing is pending.
//! These rules are pure so the persistence layer can evaluate them against
//! the rows it read under its write lock.

use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStep, Decision, StepAction};
use crate::domain::claim::ClaimStatus;
use crate::errors::WorkflowError;

/// Fails with `OutOfSequence` unless `step_order` is the current minimum pending step.
pub fn check_sequence(step_order: u32, current_min_step: u32) -> Result<(), WorkflowError> {
    if step_order > current_min_step {
        return Err(WorkflowError::OutOfSequence { step_order, current_min_step });
    }
    Ok(())
}

/// Claim status after a decision has been recorded on the active step.
pub fn next_claim_status(decision: Decision, pending_remaining: bool) -> ClaimStatus {
    match decision {
        Decision::Rejected => ClaimStatus::Rejected,
        Decision::Approved if pending_remaining => ClaimStatus::Pending,
        Decision::Approved => ClaimStatus::Approved,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub step_order: u32,
    pub new_status: ClaimStatus,
    /// The step that became actionable, if the chain is still running.
    pub next_step: Option<u32>,
}

/// In-memory view of one claim's approval steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalChain {
    status: ClaimStatus,
    steps: Vec<(u32, StepAction)>,
}

impl ApprovalChain {
    pub fn new(status: ClaimStatus, mut steps: Vec<(u32, StepAction)>) -> Self {
        steps.sort_by_key(|(order, _)| *order);
        Self { status, steps }
    }

    pub fn from_steps(status: ClaimStatus, steps: &[ApprovalStep]) -> Self {
        Self::new(status, steps.iter().map(|step| (step.step_order, step.action)).collect())
    }

    /// Fresh chain of `len` pending steps, as materialized at submission.
    pub fn pending(len: u32) -> Self {
        Self::new(ClaimStatus::Pending, (1..=len).map(|order| (order, StepAction::Pending)).collect())
    }

    pub fn status(&self) -> ClaimStatus {
        self.status
    }

    /// Smallest pending step order, i.e. the only step `resolve` may act on.
    pub fn current_step(&self) -> Option<u32> {
        self.steps
            .iter()
            .filter(|(_, action)| *action == StepAction::Pending)
            .map(|(order, _)| *order)
            .min()
    }

    pub fn action_of(&self, step_order: u32) -> Option<StepAction> {
        self.steps.iter().find(|(order, _)| *order == step_order).map(|(_, action)| *action)
    }

    /// Pending steps always form a suffix of the chain.
    pub fn pending_is_suffix(&self) -> bool {
        let mut seen_pending = false;
        for (_, action) in &self.steps {
            match action {
                StepAction::Pending => seen_pending = true,
                _ if seen_pending => return false,
                _ => {}
            }
        }
        true
    }

    pub fn resolve(
        &mut self,
        step_order: u32,
        decision: Decision,
    ) -> Result<ChainOutcome, WorkflowError> {
        if self.status != ClaimStatus::Pending
            || self.action_of(step_order) != Some(StepAction::Pending)
        {
            return Err(WorkflowError::StepNotFoundOrAlreadyProcessed);
        }

        let current = self.current_step().ok_or(WorkflowError::StepNotFoundOrAlreadyProcessed)?;
        check_sequence(step_order, current)?;

        if let Some(entry) = self.steps.iter_mut().find(|(order, _)| *order == step_order) {
            entry.1 = decision.as_action();
        }

        let next_step = self.current_step();
        let new_status = next_claim_status(decision, next_step.is_some());
        self.status = new_status;

        Ok(ChainOutcome {
            step_order,
            new_status,
            next_step: next_step.filter(|_| new_status == ClaimStatus::Pending),
        })
    }
}
