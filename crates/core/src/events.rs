use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalStepId;
use crate::domain::claim::{ClaimId, ClaimStatus};
use crate::domain::employee::EmployeeId;
use crate::domain::workflow::WorkflowId;

/// Side effects announced after a workflow transaction commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowEvent {
    DefinitionCreated {
        workflow_id: WorkflowId,
        employee_id: EmployeeId,
        approvers: Vec<EmployeeId>,
    },
    StepBecameActionable {
        claim_id: ClaimId,
        step_id: ApprovalStepId,
        approver_id: EmployeeId,
        step_order: u32,
    },
    ClaimParkedAsDraft {
        claim_id: ClaimId,
        employee_id: EmployeeId,
    },
    ClaimResolved {
        claim_id: ClaimId,
        status: ClaimStatus,
    },
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefinitionCreated { .. } => "workflow.definition.created",
            Self::StepBecameActionable { .. } => "approval.step.actionable",
            Self::ClaimParkedAsDraft { .. } => "claim.parked_as_draft",
            Self::ClaimResolved { .. } => "claim.resolved",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub correlation_id: String,
    pub actor: EmployeeId,
    pub event: WorkflowEvent,
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(correlation_id: impl Into<String>, actor: EmployeeId, event: WorkflowEvent) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            actor,
            event,
            occurred_at: Utc::now(),
        }
    }
}

/// Who triggered an operation and under which request, stamped onto every
/// event it emits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
    pub actor: EmployeeId,
}

impl EventContext {
    pub fn new(correlation_id: impl Into<String>, actor: EmployeeId) -> Self {
        Self { correlation_id: correlation_id.into(), actor }
    }

    pub fn envelope(&self, event: WorkflowEvent) -> EventEnvelope {
        EventEnvelope::new(self.correlation_id.clone(), self.actor.clone(), event)
    }
}

/// Delivery is fire-and-forget: a sink cannot fail the operation that emitted.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: EventEnvelope);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<EventEnvelope> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn of_kind(&self, name: &str) -> Vec<WorkflowEvent> {
        self.events()
            .into_iter()
            .filter(|envelope| envelope.event.name() == name)
            .map(|envelope| envelope.event)
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        match self.events.lock() {
            Ok(mut events) => events.push(envelope),
            Err(poisoned) => poisoned.into_inner().push(envelope),
        }
    }
}

/// Writes each event to the log; the default sink when no broker is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, envelope: EventEnvelope) {
        let payload = serde_json::to_string(&envelope.event)
            .unwrap_or_else(|error| format!("{{\"serialization_error\":\"{error}\"}}"));
        tracing::info!(
            event_name = envelope.event.name(),
            event_id = %envelope.event_id,
            correlation_id = %envelope.correlation_id,
            actor = %envelope.actor,
            payload = %payload,
            "workflow event emitted"
        );
    }
}
