use std::collections::HashMap;

use tokio::sync::RwLock;

use claimflow_core::{Employee, EmployeeId, WorkflowDefinition, WorkflowError};

use super::{Directory, RepositoryError, WorkflowDefinitionStore};

#[derive(Default)]
pub struct InMemoryDirectory {
    employees: RwLock<HashMap<String, Employee>>,
}

#[async_trait::async_trait]
impl Directory for InMemoryDirectory {
    async fn find_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(id.as_str()).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<Employee>, RepositoryError> {
        let wanted = name.trim().to_lowercase();
        let employees = self.employees.read().await;
        let mut matches: Vec<Employee> = employees
            .values()
            .filter(|employee| employee.name.to_lowercase() == wanted)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
}

#[async_trait::async_trait]
impl WorkflowDefinitionStore for InMemoryWorkflowStore {
    async fn find_definition(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(employee_id.as_str()).cloned())
    }

    async fn insert_definition(&self, definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(definition.employee_id.as_str()) {
            return Err(WorkflowError::DefinitionAlreadyExists(definition.employee_id.clone()));
        }
        definitions.insert(definition.employee_id.0.clone(), definition.clone());
        Ok(())
    }
}
