use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::{ClaimId, ClaimStatus};
use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalStepId(pub String);

impl std::fmt::Display for ApprovalStepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Pending,
    Approved,
    Rejected,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// The two outcomes an approver may record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_action(&self) -> StepAction {
        match self {
            Self::Approved => StepAction::Approved,
            Self::Rejected => StepAction::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: ApprovalStepId,
    pub claim_id: ClaimId,
    pub step_order: u32,
    pub approver_id: EmployeeId,
    pub action: StepAction,
    pub action_date: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

/// Row of an approver's queue: a step that `resolve` would currently accept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionableStep {
    pub step_id: ApprovalStepId,
    pub claim_id: ClaimId,
    pub step_order: u32,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub description: String,
    pub category: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResolution {
    pub claim_id: ClaimId,
    pub step_id: ApprovalStepId,
    pub step_order: u32,
    pub action: Decision,
    pub new_claim_status: ClaimStatus,
}
