use async_trait::async_trait;
use sqlx::SqliteConnection;

use claimflow_core::{ApproverSequence, EmployeeId, WorkflowDefinition, WorkflowError, WorkflowId};

use super::{
    column, decode_timestamp, encode_timestamp, is_unique_violation, RepositoryError,
    WorkflowDefinitionStore,
};
use crate::connection::{begin_immediate, commit};
use crate::DbPool;

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Loads an employee's definition on an open connection, so the submission
/// transaction reads the same snapshot it writes steps from.
pub(crate) async fn fetch_definition(
    conn: &mut SqliteConnection,
    employee_id: &EmployeeId,
) -> Result<Option<WorkflowDefinition>, RepositoryError> {
    let Some(row) =
        sqlx::query("SELECT id, created_at FROM workflow_definition WHERE employee_id = ?")
            .bind(employee_id.as_str())
            .fetch_optional(&mut *conn)
            .await?
    else {
        return Ok(None);
    };

    let id: String = column(&row, "id")?;
    let created_at: String = column(&row, "created_at")?;

    let approvers: Vec<String> = sqlx::query_scalar(
        "SELECT approver_id FROM workflow_definition_step
         WHERE workflow_id = ?
         ORDER BY position",
    )
    .bind(&id)
    .fetch_all(&mut *conn)
    .await?;

    let approvers = ApproverSequence::from_stored(approvers.into_iter().map(EmployeeId).collect())
        .ok_or_else(|| RepositoryError::Decode(format!("workflow definition {id} has no steps")))?;

    Ok(Some(WorkflowDefinition {
        id: WorkflowId(id),
        employee_id: employee_id.clone(),
        approvers,
        created_at: decode_timestamp(&created_at)?,
    }))
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    definition: &WorkflowDefinition,
) -> Result<(), WorkflowError> {
    sqlx::query("INSERT INTO workflow_definition (id, employee_id, created_at) VALUES (?, ?, ?)")
        .bind(&definition.id.0)
        .bind(definition.employee_id.as_str())
        .bind(encode_timestamp(definition.created_at))
        .execute(&mut *conn)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                WorkflowError::DefinitionAlreadyExists(definition.employee_id.clone())
            } else {
                RepositoryError::from(error).into()
            }
        })?;

    for (position, approver) in definition.approvers.numbered() {
        sqlx::query(
            "INSERT INTO workflow_definition_step (workflow_id, position, approver_id)
             VALUES (?, ?, ?)",
        )
        .bind(&definition.id.0)
        .bind(i64::from(position))
        .bind(approver.as_str())
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from)?;
    }

    Ok(())
}

#[async_trait]
impl WorkflowDefinitionStore for SqlWorkflowRepository {
    async fn find_definition(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_definition(&mut conn, employee_id).await
    }

    async fn insert_definition(&self, definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
        let mut tx = begin_immediate(&self.pool).await?;
        let result = insert_rows(&mut tx, definition).await;
        commit(tx, result).await
    }
}
