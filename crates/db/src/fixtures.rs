use std::sync::Arc;

use serde::Serialize;

use claimflow_core::{
    Employee, EmployeeId, EventContext, Role, TracingEventSink, WorkflowError,
};

use crate::connection::DbPool;
use crate::engine::WorkflowDefinitionBuilder;
use crate::repositories::{
    Directory, RepositoryError, SqlDirectory, SqlWorkflowRepository, WorkflowDefinitionStore,
};

struct SeedEmployee {
    id: &'static str,
    name: &'static str,
    role: Role,
    manager_id: Option<&'static str>,
}

/// Managers are listed before their reports so foreign keys resolve.
const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee { id: "ADM-001", name: "Ada Admin", role: Role::Admin, manager_id: None },
    SeedEmployee { id: "MGR-001", name: "Maya Patel", role: Role::Manager, manager_id: None },
    SeedEmployee {
        id: "MGR-002",
        name: "Noah Chen",
        role: Role::Manager,
        manager_id: Some("MGR-001"),
    },
    SeedEmployee { id: "FIN-001", name: "Fatima Rossi", role: Role::Manager, manager_id: None },
    SeedEmployee {
        id: "EMP-001",
        name: "Eli Turner",
        role: Role::Employee,
        manager_id: Some("MGR-001"),
    },
    SeedEmployee {
        id: "EMP-002",
        name: "Iris Novak",
        role: Role::Employee,
        manager_id: Some("MGR-002"),
    },
    SeedEmployee {
        id: "EMP-003",
        name: "Omar Haddad",
        role: Role::Employee,
        manager_id: Some("MGR-002"),
    },
];

/// `(employee, additional approvers)`; EMP-003 is left without a workflow so
/// its claims demonstrate the draft path.
const SEED_WORKFLOWS: &[(&str, &[&str])] =
    &[("EMP-001", &["FIN-001"]), ("EMP-002", &["MGR-001", "FIN-001"])];

const SEED_ACTOR: &str = "ADM-001";

/// Deterministic demo organisation for local runs and smoke checks.
pub struct DemoDirectory;

impl DemoDirectory {
    /// Loads the demo directory and workflows. Safe to run repeatedly:
    /// employees are upserted and existing workflows are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, WorkflowError> {
        let directory = Arc::new(SqlDirectory::new(pool.clone()));
        for seed in SEED_EMPLOYEES {
            directory
                .save_employee(Employee {
                    id: EmployeeId::new(seed.id),
                    name: seed.name.to_string(),
                    role: seed.role,
                    manager_id: seed.manager_id.map(EmployeeId::new),
                })
                .await?;
        }

        let builder = WorkflowDefinitionBuilder::new(
            directory,
            Arc::new(SqlWorkflowRepository::new(pool.clone())),
            Arc::new(TracingEventSink),
        );
        let context = EventContext::new("seed", EmployeeId::new(SEED_ACTOR));

        let mut workflows_created = Vec::new();
        let mut workflows_existing = Vec::new();
        for (employee, additional) in SEED_WORKFLOWS {
            let employee_id = EmployeeId::new(*employee);
            let additional = additional.iter().map(|id| EmployeeId::new(*id)).collect();
            match builder.create(&context, &employee_id, additional).await {
                Ok(_) => workflows_created.push(*employee),
                Err(WorkflowError::DefinitionAlreadyExists(_)) => workflows_existing.push(*employee),
                Err(error) => return Err(error),
            }
        }

        Ok(SeedResult {
            employees_saved: SEED_EMPLOYEES.len(),
            workflows_created,
            workflows_existing,
        })
    }

    /// Checks that every demo employee and workflow is present.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let directory = SqlDirectory::new(pool.clone());
        let store = SqlWorkflowRepository::new(pool.clone());
        let mut checks = Vec::new();

        for seed in SEED_EMPLOYEES {
            let present = directory.find_employee(&EmployeeId::new(seed.id)).await?.is_some();
            checks.push((seed.id, present));
        }
        for (employee, additional) in SEED_WORKFLOWS {
            let present = store
                .find_definition(&EmployeeId::new(*employee))
                .await?
                .is_some_and(|definition| definition.approvers.len() == additional.len() + 1);
            checks.push((*employee, present));
        }

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub employees_saved: usize,
    pub workflows_created: Vec<&'static str>,
    pub workflows_existing: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use claimflow_core::{EmployeeId, WorkflowError};

    use super::DemoDirectory;
    use crate::repositories::{Directory, SqlDirectory};
    use crate::test_support::{count_rows, memory_pool};

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = memory_pool().await;

        let first = DemoDirectory::load(&pool).await.expect("first load");
        assert_eq!(first.workflows_created, vec!["EMP-001", "EMP-002"]);
        assert!(DemoDirectory::verify(&pool).await.expect("verify").all_present);

        let second = DemoDirectory::load(&pool).await.expect("second load");
        assert!(second.workflows_created.is_empty());
        assert_eq!(second.workflows_existing, vec!["EMP-001", "EMP-002"]);
        assert_eq!(count_rows(&pool, "workflow_definition").await, 2);
        assert_eq!(count_rows(&pool, "employee").await, 7);
    }

    #[tokio::test]
    async fn empty_database_fails_verification() {
        let pool = memory_pool().await;
        let verification = DemoDirectory::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
    }

    #[tokio::test]
    async fn seeded_employee_without_workflow_still_has_a_manager() {
        let pool = memory_pool().await;
        DemoDirectory::load(&pool).await.expect("load");
        let directory = SqlDirectory::new(pool);

        assert_eq!(
            directory.resolve_manager(&EmployeeId::new("EMP-003")).await,
            Ok(EmployeeId::new("MGR-002"))
        );
        assert!(matches!(
            directory.resolve_manager(&EmployeeId::new("MGR-001")).await,
            Err(WorkflowError::NoManagerAssigned(_))
        ));
    }
}
