//! Claim approval workflow backed by SQLite.
//!
//! Each service owns one operation. [`ClaimWorkflowEngine`] wires them to a
//! single pool and event sink for the HTTP and CLI surfaces.

use std::sync::Arc;

use claimflow_core::{
    ActionableStep, ApprovalStep, ApprovalStepId, Claim, ClaimFields, ClaimId, Decision,
    EmployeeId, EventContext, EventSink, StepResolution, SubmissionOutcome, WorkflowDefinition,
    WorkflowError,
};

use crate::repositories::{SqlClaimRepository, SqlDirectory, SqlWorkflowRepository};
use crate::DbPool;

pub mod definitions;
pub mod queue;
pub mod resolution;
pub mod submission;

pub use definitions::WorkflowDefinitionBuilder;
pub use queue::PendingQueue;
pub use resolution::StepResolver;
pub use submission::ClaimSubmitter;

pub struct ClaimWorkflowEngine {
    directory: Arc<SqlDirectory>,
    definitions: WorkflowDefinitionBuilder<SqlDirectory, SqlWorkflowRepository>,
    submitter: ClaimSubmitter,
    resolver: StepResolver,
    queue: PendingQueue,
    claims: SqlClaimRepository,
}

impl ClaimWorkflowEngine {
    pub fn new(pool: DbPool, events: Arc<dyn EventSink>) -> Self {
        let directory = Arc::new(SqlDirectory::new(pool.clone()));
        let store = Arc::new(SqlWorkflowRepository::new(pool.clone()));

        Self {
            definitions: WorkflowDefinitionBuilder::new(directory.clone(), store, events.clone()),
            directory,
            submitter: ClaimSubmitter::new(pool.clone(), events.clone()),
            resolver: StepResolver::new(pool.clone(), events),
            queue: PendingQueue::new(pool.clone()),
            claims: SqlClaimRepository::new(pool),
        }
    }

    pub fn directory(&self) -> &SqlDirectory {
        &self.directory
    }

    pub async fn create_definition(
        &self,
        context: &EventContext,
        employee_id: &EmployeeId,
        additional: Vec<EmployeeId>,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        self.definitions.create(context, employee_id, additional).await
    }

    pub async fn find_definition(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<WorkflowDefinition>, WorkflowError> {
        self.definitions.find(employee_id).await
    }

    pub async fn submit(
        &self,
        context: &EventContext,
        employee_id: &EmployeeId,
        fields: &ClaimFields,
    ) -> Result<SubmissionOutcome, WorkflowError> {
        self.submitter.submit(context, employee_id, fields).await
    }

    pub async fn resolve(
        &self,
        context: &EventContext,
        approver_id: &EmployeeId,
        step_id: &ApprovalStepId,
        decision: Decision,
        remarks: Option<String>,
    ) -> Result<StepResolution, WorkflowError> {
        self.resolver.resolve(context, approver_id, step_id, decision, remarks).await
    }

    pub async fn list_actionable(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ActionableStep>, WorkflowError> {
        self.queue.list_actionable(approver_id).await
    }

    pub async fn find_claim(&self, claim_id: &ClaimId) -> Result<Option<Claim>, WorkflowError> {
        Ok(self.claims.find_claim(claim_id).await?)
    }

    pub async fn list_steps(&self, claim_id: &ClaimId) -> Result<Vec<ApprovalStep>, WorkflowError> {
        Ok(self.claims.list_steps(claim_id).await?)
    }
}
