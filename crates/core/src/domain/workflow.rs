use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

/// Ordered approvers for one employee's claims.
///
/// The only public constructor is [`ApproverSequence::manager_first`], so a
/// sequence is never empty and its first entry is always the manager that was
/// assigned when the definition was built. Loading a stored sequence goes
/// through [`ApproverSequence::from_stored`], which only checks non-emptiness
/// because the manager snapshot may no longer match the live directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EmployeeId>", into = "Vec<EmployeeId>")]
pub struct ApproverSequence(Vec<EmployeeId>);

impl ApproverSequence {
    /// `[manager] ++ additional`, tail order preserved exactly as given.
    pub fn manager_first(manager: EmployeeId, additional: Vec<EmployeeId>) -> Self {
        let mut approvers = Vec::with_capacity(additional.len() + 1);
        approvers.push(manager);
        approvers.extend(additional);
        Self(approvers)
    }

    pub fn from_stored(approvers: Vec<EmployeeId>) -> Option<Self> {
        (!approvers.is_empty()).then_some(Self(approvers))
    }

    pub fn manager(&self) -> &EmployeeId {
        // Non-empty by construction.
        &self.0[0]
    }

    pub fn additional(&self) -> &[EmployeeId] {
        &self.0[1..]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[EmployeeId] {
        &self.0
    }

    /// `(step_order, approver)` pairs with 1-based step orders.
    pub fn numbered(&self) -> impl Iterator<Item = (u32, &EmployeeId)> + '_ {
        self.0.iter().enumerate().map(|(index, approver)| (index as u32 + 1, approver))
    }
}

impl TryFrom<Vec<EmployeeId>> for ApproverSequence {
    type Error = &'static str;

    fn try_from(approvers: Vec<EmployeeId>) -> Result<Self, Self::Error> {
        Self::from_stored(approvers).ok_or("approver sequence must name at least one approver")
    }
}

impl From<ApproverSequence> for Vec<EmployeeId> {
    fn from(sequence: ApproverSequence) -> Self {
        sequence.0
    }
}
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub employee_id: EmployeeId,
    pub approvers: ApproverSequence,
    pub created_at: DateTime<Utc>,
}
