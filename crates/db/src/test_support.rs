use std::sync::Arc;

use claimflow_core::{
    AmountInput, ApprovalStep, ClaimFields, Employee, EmployeeId, EventContext, InMemoryEventSink,
    Role, WorkflowDefinition,
};

use crate::engine::{ClaimSubmitter, WorkflowDefinitionBuilder};
use crate::repositories::{Directory, SqlClaimRepository, SqlDirectory, SqlWorkflowRepository};
use crate::{connect_with_settings, migrations, DbPool};

pub(crate) async fn memory_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

pub(crate) fn employee(id: &str, name: &str, role: Role, manager: Option<&str>) -> Employee {
    Employee {
        id: EmployeeId::new(id),
        name: name.to_string(),
        role,
        manager_id: manager.map(EmployeeId::new),
    }
}

/// ADM-1, managers MGR-1/MGR-2/FIN-1/CFO-1, EMP-1 and EMP-2 reporting to
/// MGR-1, and EMP-3 with no manager.
pub(crate) async fn seed_org(pool: &DbPool) {
    let directory = SqlDirectory::new(pool.clone());
    for record in [
        employee("ADM-1", "Ada Admin", Role::Admin, None),
        employee("MGR-1", "Maya Manager", Role::Manager, None),
        employee("MGR-2", "Noor Manager", Role::Manager, None),
        employee("FIN-1", "Fin Approver", Role::Manager, None),
        employee("CFO-1", "Cora Officer", Role::Manager, None),
        employee("EMP-1", "Eli Employee", Role::Employee, Some("MGR-1")),
        employee("EMP-2", "Ivy Employee", Role::Employee, Some("MGR-1")),
        employee("EMP-3", "Orphan Oscar", Role::Employee, None),
    ] {
        directory.save_employee(record).await.expect("seed employee");
    }
}

pub(crate) async fn create_definition(
    pool: &DbPool,
    employee_id: &str,
    additional: &[&str],
) -> WorkflowDefinition {
    let builder = WorkflowDefinitionBuilder::new(
        Arc::new(SqlDirectory::new(pool.clone())),
        Arc::new(SqlWorkflowRepository::new(pool.clone())),
        Arc::new(InMemoryEventSink::default()),
    );
    builder
        .create(
            &EventContext::new("test", EmployeeId::new("ADM-1")),
            &EmployeeId::new(employee_id),
            additional.iter().map(|id| EmployeeId::new(*id)).collect(),
        )
        .await
        .expect("create definition")
}

pub(crate) fn fields(description: &str, amount: &str) -> ClaimFields {
    ClaimFields {
        description: Some(description.to_string()),
        category: Some("travel".to_string()),
        amount: Some(AmountInput::Text(amount.to_string())),
        currency: Some("usd".to_string()),
        ..ClaimFields::default()
    }
}

/// Seeds the org, gives EMP-1 the workflow `[MGR-1] ++ additional` and
/// submits one claim; returns its steps in order.
pub(crate) async fn submit_claim_with_workflow(pool: &DbPool, additional: &[&str]) -> Vec<ApprovalStep> {
    seed_org(pool).await;
    create_definition(pool, "EMP-1", additional).await;

    let outcome = ClaimSubmitter::new(pool.clone(), Arc::new(InMemoryEventSink::default()))
        .submit(
            &EventContext::new("test", EmployeeId::new("EMP-1")),
            &EmployeeId::new("EMP-1"),
            &fields("Team offsite", "250"),
        )
        .await
        .expect("submit claim");

    SqlClaimRepository::new(pool.clone()).list_steps(&outcome.claim.id).await.expect("list steps")
}

pub(crate) async fn count_rows(pool: &DbPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}
