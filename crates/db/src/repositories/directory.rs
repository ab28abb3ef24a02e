use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use claimflow_core::{Employee, EmployeeId, Role};

use super::{column, encode_timestamp, Directory, RepositoryError};
use crate::DbPool;

pub struct SqlDirectory {
    pool: DbPool,
}

impl SqlDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_employee(row: &SqliteRow) -> Result<Employee, RepositoryError> {
    let role: String = column(row, "role")?;
    let manager_id: Option<String> = column(row, "manager_id")?;

    Ok(Employee {
        id: EmployeeId(column(row, "id")?),
        name: column(row, "name")?,
        role: Role::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown employee role `{role}`")))?,
        manager_id: manager_id.map(EmployeeId),
    })
}

#[async_trait]
impl Directory for SqlDirectory {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, role, manager_id FROM employee WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_employee).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, role, manager_id FROM employee
             WHERE name = ? COLLATE NOCASE
             ORDER BY id",
        )
        .bind(name.trim())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_employee).collect()
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (id, name, role, manager_id, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                manager_id = excluded.manager_id",
        )
        .bind(employee.id.as_str())
        .bind(&employee.name)
        .bind(employee.role.as_str())
        .bind(employee.manager_id.as_ref().map(EmployeeId::as_str))
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use claimflow_core::{Employee, EmployeeId, Role, WorkflowError};

    use super::SqlDirectory;
    use crate::repositories::Directory;
    use crate::test_support::{employee, memory_pool};

    async fn directory() -> SqlDirectory {
        let directory = SqlDirectory::new(memory_pool().await);
        directory.save_employee(employee("MGR-1", "Maya Manager", Role::Manager, None)).await.expect("save");
        directory
            .save_employee(employee("EMP-1", "Eli Employee", Role::Employee, Some("MGR-1")))
            .await
            .expect("save");
        directory
            .save_employee(employee("EMP-2", "Orphan Oscar", Role::Employee, None))
            .await
            .expect("save");
        directory
    }

    #[tokio::test]
    async fn resolve_manager_returns_direct_manager() {
        let directory = directory().await;
        let manager = directory.resolve_manager(&EmployeeId::new("EMP-1")).await.expect("manager");
        assert_eq!(manager, EmployeeId::new("MGR-1"));
    }

    #[tokio::test]
    async fn resolve_manager_distinguishes_missing_employee_from_missing_manager() {
        let directory = directory().await;

        assert_eq!(
            directory.resolve_manager(&EmployeeId::new("EMP-404")).await,
            Err(WorkflowError::EmployeeNotFound(EmployeeId::new("EMP-404")))
        );
        assert_eq!(
            directory.resolve_manager(&EmployeeId::new("EMP-2")).await,
            Err(WorkflowError::NoManagerAssigned(EmployeeId::new("EMP-2")))
        );
    }

    #[tokio::test]
    async fn validate_approvers_reports_every_unknown_id_once() {
        let directory = directory().await;
        let ids = vec![
            EmployeeId::new("MGR-1"),
            EmployeeId::new("GHOST-1"),
            EmployeeId::new("EMP-2"),
            EmployeeId::new("GHOST-2"),
            EmployeeId::new("GHOST-1"),
        ];

        assert_eq!(
            directory.validate_approvers(&ids).await,
            Err(WorkflowError::InvalidApproverList(vec![
                EmployeeId::new("GHOST-1"),
                EmployeeId::new("GHOST-2"),
            ]))
        );
        assert!(directory.validate_approvers(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn resolve_by_name_is_case_insensitive_and_rejects_ambiguity() {
        let directory = directory().await;
        assert_eq!(
            directory.resolve_by_name("  maya manager ").await,
            Ok(EmployeeId::new("MGR-1"))
        );

        directory
            .save_employee(employee("MGR-2", "Maya Manager", Role::Manager, None))
            .await
            .expect("save duplicate name");
        assert_eq!(
            directory.resolve_by_name("Maya Manager").await,
            Err(WorkflowError::AmbiguousEmployeeName { name: "Maya Manager".into(), matches: 2 })
        );
        assert!(matches!(
            directory.resolve_by_name("Nobody").await,
            Err(WorkflowError::EmployeeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_employee_updates_existing_record() {
        let directory = directory().await;
        directory
            .save_employee(Employee {
                id: EmployeeId::new("EMP-2"),
                name: "Oscar Reassigned".into(),
                role: Role::Employee,
                manager_id: Some(EmployeeId::new("MGR-1")),
            })
            .await
            .expect("update");

        let updated =
            directory.find_employee(&EmployeeId::new("EMP-2")).await.expect("find").expect("exists");
        assert_eq!(updated.name, "Oscar Reassigned");
        assert_eq!(updated.manager_id, Some(EmployeeId::new("MGR-1")));
    }

    #[tokio::test]
    async fn save_employee_rejects_unknown_manager() {
        let directory = directory().await;
        let result = directory
            .save_employee(employee("EMP-3", "Dangling", Role::Employee, Some("MGR-404")))
            .await;
        assert!(result.is_err());
    }
}
