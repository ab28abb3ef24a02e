use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::info;

use claimflow_core::domain::new_id;
use claimflow_core::{
    ApproverSequence, EmployeeId, EventContext, EventSink, WorkflowDefinition, WorkflowError,
    WorkflowEvent, WorkflowId,
};

use crate::repositories::{Directory, WorkflowDefinitionStore};

/// Builds and persists the one approval workflow an employee may have.
pub struct WorkflowDefinitionBuilder<D, W> {
    directory: Arc<D>,
    store: Arc<W>,
    events: Arc<dyn EventSink>,
}

impl<D, W> WorkflowDefinitionBuilder<D, W>
where
    D: Directory,
    W: WorkflowDefinitionStore,
{
    pub fn new(directory: Arc<D>, store: Arc<W>, events: Arc<dyn EventSink>) -> Self {
        Self { directory, store, events }
    }

    /// Stores `[manager] ++ additional` for `employee_id`.
    ///
    /// The manager is read from the directory now and kept as a snapshot.
    /// `additional` is stored in the order given; it is not deduplicated or
    /// checked against the manager or the employee.
    pub async fn create(
        &self,
        context: &EventContext,
        employee_id: &EmployeeId,
        additional: Vec<EmployeeId>,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        if self.store.find_definition(employee_id).await?.is_some() {
            return Err(WorkflowError::DefinitionAlreadyExists(employee_id.clone()));
        }

        let manager = self.directory.resolve_manager(employee_id).await?;
        self.directory.validate_approvers(&additional).await?;

        let definition = WorkflowDefinition {
            id: WorkflowId(new_id("WFD")),
            employee_id: employee_id.clone(),
            approvers: ApproverSequence::manager_first(manager, additional),
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.store.insert_definition(&definition).await?;

        info!(
            event_name = "workflow.definition.created",
            correlation_id = %context.correlation_id,
            actor = %context.actor,
            workflow_id = %definition.id.0,
            employee_id = %definition.employee_id,
            steps = definition.approvers.len(),
            "approval workflow created"
        );
        self.events.emit(context.envelope(WorkflowEvent::DefinitionCreated {
            workflow_id: definition.id.clone(),
            employee_id: definition.employee_id.clone(),
            approvers: definition.approvers.as_slice().to_vec(),
        }));

        Ok(definition)
    }

    pub async fn find(&self, employee_id: &EmployeeId) -> Result<Option<WorkflowDefinition>, WorkflowError> {
        Ok(self.store.find_definition(employee_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use claimflow_core::{
        EmployeeId, EventContext, InMemoryEventSink, Role, WorkflowError, WorkflowEvent,
    };

    use super::WorkflowDefinitionBuilder;
    use crate::repositories::{
        Directory, InMemoryDirectory, InMemoryWorkflowStore, SqlDirectory, SqlWorkflowRepository,
        WorkflowDefinitionStore,
    };
    use crate::test_support::{employee, memory_pool};

    fn ids(raw: &[&str]) -> Vec<EmployeeId> {
        raw.iter().map(|id| EmployeeId::new(*id)).collect()
    }

    fn context() -> EventContext {
        EventContext::new("req-def", EmployeeId::new("ADM-1"))
    }

    async fn in_memory_builder(
    ) -> (WorkflowDefinitionBuilder<InMemoryDirectory, InMemoryWorkflowStore>, InMemoryEventSink) {
        let directory = InMemoryDirectory::default();
        for (id, role, manager) in [
            ("MGR-1", Role::Manager, None),
            ("FIN-1", Role::Manager, None),
            ("CFO-1", Role::Manager, None),
            ("EMP-1", Role::Employee, Some("MGR-1")),
            ("EMP-2", Role::Employee, None),
        ] {
            directory.save_employee(employee(id, id, role, manager)).await.expect("seed");
        }
        let sink = InMemoryEventSink::default();
        let builder = WorkflowDefinitionBuilder::new(
            Arc::new(directory),
            Arc::new(InMemoryWorkflowStore::default()),
            Arc::new(sink.clone()),
        );
        (builder, sink)
    }

    #[tokio::test]
    async fn manager_comes_first_and_tail_order_is_literal() {
        let (builder, sink) = in_memory_builder().await;
        let definition = builder
            .create(&context(), &EmployeeId::new("EMP-1"), ids(&["CFO-1", "FIN-1"]))
            .await
            .expect("create");

        assert_eq!(definition.approvers.as_slice(), ids(&["MGR-1", "CFO-1", "FIN-1"]).as_slice());
        assert_eq!(sink.of_kind("workflow.definition.created").len(), 1);
    }

    #[tokio::test]
    async fn second_definition_fails_and_keeps_the_first() {
        let (builder, sink) = in_memory_builder().await;
        let employee_id = EmployeeId::new("EMP-1");
        let first =
            builder.create(&context(), &employee_id, ids(&["FIN-1"])).await.expect("first");

        let error = builder
            .create(&context(), &employee_id, ids(&["CFO-1"]))
            .await
            .expect_err("second create");
        assert_eq!(error, WorkflowError::DefinitionAlreadyExists(employee_id.clone()));

        let stored = builder.find(&employee_id).await.expect("find").expect("exists");
        assert_eq!(stored, first);
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn directory_errors_propagate_without_writing() {
        let (builder, _) = in_memory_builder().await;

        assert_eq!(
            builder.create(&context(), &EmployeeId::new("EMP-404"), Vec::new()).await,
            Err(WorkflowError::EmployeeNotFound(EmployeeId::new("EMP-404")))
        );
        assert_eq!(
            builder.create(&context(), &EmployeeId::new("EMP-2"), Vec::new()).await,
            Err(WorkflowError::NoManagerAssigned(EmployeeId::new("EMP-2")))
        );
        assert_eq!(
            builder
                .create(&context(), &EmployeeId::new("EMP-1"), ids(&["FIN-1", "NOPE-1"]))
                .await,
            Err(WorkflowError::InvalidApproverList(ids(&["NOPE-1"])))
        );
        assert!(builder.find(&EmployeeId::new("EMP-1")).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn sql_backed_builder_persists_manager_snapshot() {
        let pool = memory_pool().await;
        let directory = Arc::new(SqlDirectory::new(pool.clone()));
        directory.save_employee(employee("MGR-1", "Maya", Role::Manager, None)).await.expect("seed");
        directory.save_employee(employee("MGR-2", "Noor", Role::Manager, None)).await.expect("seed");
        directory
            .save_employee(employee("EMP-1", "Eli", Role::Employee, Some("MGR-1")))
            .await
            .expect("seed");

        let store = Arc::new(SqlWorkflowRepository::new(pool));
        let sink = InMemoryEventSink::default();
        let builder =
            WorkflowDefinitionBuilder::new(directory.clone(), store.clone(), Arc::new(sink.clone()));

        let created =
            builder.create(&context(), &EmployeeId::new("EMP-1"), Vec::new()).await.expect("create");

        directory
            .save_employee(employee("EMP-1", "Eli", Role::Employee, Some("MGR-2")))
            .await
            .expect("reassign manager");

        let stored =
            store.find_definition(&EmployeeId::new("EMP-1")).await.expect("find").expect("exists");
        assert_eq!(stored, created);
        assert_eq!(stored.approvers.manager(), &EmployeeId::new("MGR-1"));

        match sink.events().first().map(|envelope| &envelope.event) {
            Some(WorkflowEvent::DefinitionCreated { approvers, .. }) => {
                assert_eq!(approvers, &ids(&["MGR-1"]));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
