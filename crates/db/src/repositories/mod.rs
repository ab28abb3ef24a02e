use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};
use thiserror::Error;

use claimflow_core::{Employee, EmployeeId, WorkflowDefinition, WorkflowError};

pub mod claim;
pub mod directory;
pub mod memory;
pub mod workflow;

pub use claim::SqlClaimRepository;
pub use directory::SqlDirectory;
pub use memory::{InMemoryDirectory, InMemoryWorkflowStore};
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("claim status cannot move from {from} to {to}")]
    IllegalTransition { from: &'static str, to: &'static str },
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        WorkflowError::Store(error.to_string())
    }
}

/// Read access to the employee directory plus the lookups built on it.
///
/// Implementors supply the three storage primitives; manager resolution and
/// approver validation are shared so every backend reports the same errors.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;

    /// Case-insensitive exact match on the trimmed name, ordered by id.
    async fn find_by_name(&self, name: &str) -> Result<Vec<Employee>, RepositoryError>;

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError>;

    async fn resolve_manager(&self, id: &EmployeeId) -> Result<EmployeeId, WorkflowError> {
        let employee = self
            .find_employee(id)
            .await?
            .ok_or_else(|| WorkflowError::EmployeeNotFound(id.clone()))?;
        employee.manager_id.ok_or_else(|| WorkflowError::NoManagerAssigned(id.clone()))
    }

    /// Fails with every unknown id, in the order first given.
    async fn validate_approvers(&self, ids: &[EmployeeId]) -> Result<(), WorkflowError> {
        let mut unknown: Vec<EmployeeId> = Vec::new();
        for id in ids {
            if unknown.contains(id) {
                continue;
            }
            if self.find_employee(id).await?.is_none() {
                unknown.push(id.clone());
            }
        }

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::InvalidApproverList(unknown))
        }
    }

    async fn resolve_by_name(&self, name: &str) -> Result<EmployeeId, WorkflowError> {
        let mut matches = self.find_by_name(name).await?;
        match matches.len() {
            0 => Err(WorkflowError::EmployeeNotFound(EmployeeId::new(name.trim()))),
            1 => Ok(matches.remove(0).id),
            count => Err(WorkflowError::AmbiguousEmployeeName {
                name: name.trim().to_string(),
                matches: count,
            }),
        }
    }
}

#[async_trait]
pub trait WorkflowDefinitionStore: Send + Sync {
    async fn find_definition(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError>;

    /// Persists a new definition; a second one for the same employee fails
    /// with `DefinitionAlreadyExists` and writes nothing.
    async fn insert_definition(&self, definition: &WorkflowDefinition) -> Result<(), WorkflowError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

pub(crate) fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{decode_timestamp, encode_timestamp};

    #[test]
    fn timestamps_are_fixed_width_and_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("valid time");
        let later = earlier + chrono::Duration::microseconds(1);

        let a = encode_timestamp(earlier);
        let b = encode_timestamp(later);

        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_timestamp(&a).expect("decode"), earlier);
    }

    #[test]
    fn malformed_timestamp_is_a_decode_error() {
        assert!(decode_timestamp("yesterday").is_err());
    }
}
