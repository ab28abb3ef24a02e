pub mod connection;
pub mod engine;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

#[cfg(test)]
mod test_support;

pub use connection::{connect, connect_with_settings, DbPool};
pub use engine::{
    ClaimSubmitter, ClaimWorkflowEngine, PendingQueue, StepResolver, WorkflowDefinitionBuilder,
};
pub use fixtures::{DemoDirectory, SeedResult, VerificationResult};
pub use repositories::{Directory, RepositoryError, WorkflowDefinitionStore};
