use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use claimflow_core::{
    ApprovalStep, ApprovalStepId, Claim, ClaimId, ClaimStatus, EmployeeId, StepAction,
};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_claim(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, employee_id, description, category, amount, currency, receipt_ref,
                    remarks, status, submitted_at
             FROM claim WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_claim).transpose()
    }

    /// Every step of a claim ordered by `step_order`, whatever its action.
    pub async fn list_steps(&self, claim_id: &ClaimId) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_steps(&mut conn, claim_id).await
    }
}

pub(crate) fn parse_decimal(value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|e| RepositoryError::Decode(format!("invalid amount `{value}`: {e}")))
}

pub(crate) fn parse_claim_status(value: &str) -> Result<ClaimStatus, RepositoryError> {
    ClaimStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown claim status `{value}`")))
}

pub(crate) fn parse_step_order(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("step_order {value} out of range")))
}

fn row_to_claim(row: &SqliteRow) -> Result<Claim, RepositoryError> {
    let amount: String = column(row, "amount")?;
    let status: String = column(row, "status")?;
    let submitted_at: String = column(row, "submitted_at")?;

    Ok(Claim {
        id: ClaimId(column(row, "id")?),
        employee_id: EmployeeId(column(row, "employee_id")?),
        description: column(row, "description")?,
        category: column(row, "category")?,
        amount: parse_decimal(&amount)?,
        currency: column(row, "currency")?,
        receipt_ref: column(row, "receipt_ref")?,
        remarks: column(row, "remarks")?,
        status: parse_claim_status(&status)?,
        submitted_at: decode_timestamp(&submitted_at)?,
    })
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let action: String = column(row, "action")?;
    let action_date: Option<String> = column(row, "action_date")?;

    Ok(ApprovalStep {
        id: ApprovalStepId(column(row, "id")?),
        claim_id: ClaimId(column(row, "claim_id")?),
        step_order: parse_step_order(column(row, "step_order")?)?,
        approver_id: EmployeeId(column(row, "approver_id")?),
        action: StepAction::parse(&action)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step action `{action}`")))?,
        action_date: action_date.as_deref().map(decode_timestamp).transpose()?,
        remarks: column(row, "remarks")?,
    })
}

pub(crate) async fn fetch_steps(
    conn: &mut SqliteConnection,
    claim_id: &ClaimId,
) -> Result<Vec<ApprovalStep>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, claim_id, step_order, approver_id, action, action_date, remarks
         FROM approval_step
         WHERE claim_id = ?
         ORDER BY step_order",
    )
    .bind(&claim_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_step).collect()
}

pub(crate) async fn insert_claim(conn: &mut SqliteConnection, claim: &Claim) -> Result<(), sqlx::Error> {
    let submitted_at = encode_timestamp(claim.submitted_at);
    sqlx::query(
        "INSERT INTO claim (id, employee_id, description, category, amount, currency,
                            receipt_ref, remarks, status, submitted_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&claim.id.0)
    .bind(claim.employee_id.as_str())
    .bind(&claim.description)
    .bind(&claim.category)
    .bind(claim.amount.to_string())
    .bind(&claim.currency)
    .bind(&claim.receipt_ref)
    .bind(&claim.remarks)
    .bind(claim.status.as_str())
    .bind(&submitted_at)
    .bind(&submitted_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn insert_step(conn: &mut SqliteConnection, step: &ApprovalStep) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO approval_step (id, claim_id, step_order, approver_id, action)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&step.id.0)
    .bind(&step.claim_id.0)
    .bind(i64::from(step.step_order))
    .bind(step.approver_id.as_str())
    .bind(step.action.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Moves a claim from `from` to `to`. Returns false if the claim was not in `from`.
/// Transitions outside the claim lifecycle are refused before touching the row.
pub(crate) async fn update_claim_status(
    conn: &mut SqliteConnection,
    claim_id: &ClaimId,
    from: ClaimStatus,
    to: ClaimStatus,
    at: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    if !from.can_transition_to(to) {
        return Err(RepositoryError::IllegalTransition { from: from.as_str(), to: to.as_str() });
    }

    let result = sqlx::query("UPDATE claim SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(encode_timestamp(at))
        .bind(&claim_id.0)
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
