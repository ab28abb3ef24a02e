use sqlx::sqlite::SqliteRow;

use claimflow_core::{ActionableStep, ApprovalStepId, ClaimId, EmployeeId, WorkflowError};

use crate::repositories::claim::{parse_decimal, parse_step_order};
use crate::repositories::{column, decode_timestamp, RepositoryError};
use crate::DbPool;

/// An approver sees a step only when `StepResolver::resolve` would accept it:
/// the step is pending, its claim is pending, and no earlier step of that
/// claim is still pending.
const ACTIONABLE_SQL: &str = "
SELECT s.id AS step_id, s.claim_id, s.step_order,
       c.employee_id, e.name AS employee_name, c.description, c.category,
       c.amount, c.currency, c.submitted_at
FROM approval_step s
JOIN claim c ON c.id = s.claim_id
JOIN employee e ON e.id = c.employee_id
WHERE s.approver_id = ?
  AND s.action = 'pending'
  AND c.status = 'pending'
  AND s.step_order = (
      SELECT MIN(p.step_order) FROM approval_step p
      WHERE p.claim_id = s.claim_id AND p.action = 'pending'
  )
ORDER BY c.submitted_at ASC, c.rowid ASC, s.step_order ASC";

pub struct PendingQueue {
    pool: DbPool,
}

impl PendingQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Oldest claim first.
    pub async fn list_actionable(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ActionableStep>, WorkflowError> {
        let rows = sqlx::query(ACTIONABLE_SQL)
            .bind(approver_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_actionable).collect::<Result<Vec<_>, _>>()?)
    }
}

fn row_to_actionable(row: &SqliteRow) -> Result<ActionableStep, RepositoryError> {
    let amount: String = column(row, "amount")?;
    let submitted_at: String = column(row, "submitted_at")?;

    Ok(ActionableStep {
        step_id: ApprovalStepId(column(row, "step_id")?),
        claim_id: ClaimId(column(row, "claim_id")?),
        step_order: parse_step_order(column(row, "step_order")?)?,
        employee_id: EmployeeId(column(row, "employee_id")?),
        employee_name: column(row, "employee_name")?,
        description: column(row, "description")?,
        category: column(row, "category")?,
        amount: parse_decimal(&amount)?,
        currency: column(row, "currency")?,
        submitted_at: decode_timestamp(&submitted_at)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use claimflow_core::{Decision, EmployeeId, EventContext, InMemoryEventSink};

    use super::PendingQueue;
    use crate::engine::{ClaimSubmitter, StepResolver};
    use crate::test_support::{create_definition, fields, memory_pool, seed_org};

    fn ids(queue: &[claimflow_core::ActionableStep]) -> Vec<String> {
        queue.iter().map(|entry| entry.claim_id.0.clone()).collect()
    }

    #[tokio::test]
    async fn later_approver_sees_claim_only_after_earlier_step_resolves() {
        let pool = memory_pool().await;
        seed_org(&pool).await;
        create_definition(&pool, "EMP-1", &["FIN-1"]).await;
        let sink = Arc::new(InMemoryEventSink::default());
        let submitter = ClaimSubmitter::new(pool.clone(), sink.clone());
        let resolver = StepResolver::new(pool.clone(), sink);
        let queue = PendingQueue::new(pool.clone());

        let outcome = submitter
            .submit(
                &EventContext::new("req-q", EmployeeId::new("EMP-1")),
                &EmployeeId::new("EMP-1"),
                &fields("Client dinner", "88.20"),
            )
            .await
            .expect("submit");

        let manager_queue = queue.list_actionable(&EmployeeId::new("MGR-1")).await.expect("queue");
        assert_eq!(ids(&manager_queue), vec![outcome.claim.id.0.clone()]);
        assert_eq!(manager_queue[0].step_order, 1);
        assert_eq!(manager_queue[0].employee_name, "Eli Employee");
        assert!(queue.list_actionable(&EmployeeId::new("FIN-1")).await.expect("queue").is_empty());

        resolver
            .resolve(
                &EventContext::new("req-q2", EmployeeId::new("MGR-1")),
                &EmployeeId::new("MGR-1"),
                &manager_queue[0].step_id,
                Decision::Approved,
                None,
            )
            .await
            .expect("approve step 1");

        assert!(queue.list_actionable(&EmployeeId::new("MGR-1")).await.expect("queue").is_empty());
        let finance_queue = queue.list_actionable(&EmployeeId::new("FIN-1")).await.expect("queue");
        assert_eq!(ids(&finance_queue), vec![outcome.claim.id.0]);
        assert_eq!(finance_queue[0].step_order, 2);
    }

    #[tokio::test]
    async fn queue_is_oldest_first_and_drops_rejected_and_draft_claims() {
        let pool = memory_pool().await;
        seed_org(&pool).await;
        create_definition(&pool, "EMP-1", &["FIN-1"]).await;
        create_definition(&pool, "EMP-2", &[]).await;
        let sink = Arc::new(InMemoryEventSink::default());
        let submitter = ClaimSubmitter::new(pool.clone(), sink.clone());
        let resolver = StepResolver::new(pool.clone(), sink);
        let queue = PendingQueue::new(pool.clone());

        let mut submitted = Vec::new();
        for (employee, description) in
            [("EMP-1", "Train"), ("EMP-2", "Parking"), ("EMP-1", "Books"), ("EMP-3", "Draft")]
        {
            let outcome = submitter
                .submit(
                    &EventContext::new("req-q", EmployeeId::new(employee)),
                    &EmployeeId::new(employee),
                    &fields(description, "10"),
                )
                .await
                .expect("submit");
            submitted.push(outcome.claim.id.0);
        }

        let manager_queue = queue.list_actionable(&EmployeeId::new("MGR-1")).await.expect("queue");
        assert_eq!(ids(&manager_queue), submitted[..3].to_vec());

        resolver
            .resolve(
                &EventContext::new("req-q3", EmployeeId::new("MGR-1")),
                &EmployeeId::new("MGR-1"),
                &manager_queue[0].step_id,
                Decision::Rejected,
                Some("no receipt".into()),
            )
            .await
            .expect("reject");

        let manager_queue = queue.list_actionable(&EmployeeId::new("MGR-1")).await.expect("queue");
        assert_eq!(ids(&manager_queue), submitted[1..3].to_vec());
        assert!(queue.list_actionable(&EmployeeId::new("FIN-1")).await.expect("queue").is_empty());
    }
}
