use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(pub String);

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Draft is only ever entered from the submission path and never left.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        matches!(
            (self, next),
            (ClaimStatus::Pending, ClaimStatus::Pending)
                | (ClaimStatus::Pending, ClaimStatus::Approved)
                | (ClaimStatus::Pending, ClaimStatus::Rejected)
                | (ClaimStatus::Pending, ClaimStatus::Draft)
        )
    }
}

/// Raw amount as it arrives over the wire: either a JSON number or a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    fn to_decimal(&self) -> Option<Decimal> {
        let raw = match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.trim().to_string(),
        };
        Decimal::from_str(&raw).ok().or_else(|| Decimal::from_scientific(&raw).ok())
    }
}

impl From<Decimal> for AmountInput {
    fn from(value: Decimal) -> Self {
        Self::Text(value.to_string())
    }
}

/// Unvalidated claim payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimFields {
    pub description: Option<String>,
    pub category: Option<String>,
    pub amount: Option<AmountInput>,
    pub currency: Option<String>,
    pub receipt_ref: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &str, message: &str) -> Self {
        Self { field: field.to_string(), message: message.to_string() }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidClaimFields {
    pub description: String,
    pub category: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub receipt_ref: Option<String>,
    pub remarks: Option<String>,
}

impl ClaimFields {
    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> Result<ValidClaimFields, Vec<FieldViolation>> {
        let mut violations = Vec::new();

        let description = non_blank(self.description.as_deref());
        if description.is_none() {
            violations.push(FieldViolation::new("description", "is required and must not be blank"));
        }

        let amount = match &self.amount {
            None => {
                violations.push(FieldViolation::new("amount", "is required"));
                None
            }
            Some(raw) => match raw.to_decimal() {
                None => {
                    violations.push(FieldViolation::new("amount", "must be numeric"));
                    None
                }
                Some(value) if value <= Decimal::ZERO => {
                    violations.push(FieldViolation::new("amount", "must be greater than zero"));
                    None
                }
                Some(value) => Some(value.normalize()),
            },
        };

        let currency = match non_blank(self.currency.as_deref()) {
            None => {
                violations.push(FieldViolation::new("currency", "is required"));
                None
            }
            Some(code) if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) => {
                Some(code.to_ascii_uppercase())
            }
            Some(_) => {
                violations.push(FieldViolation::new("currency", "must be a 3-letter code"));
                None
            }
        };

        match (description, amount, currency) {
            (Some(description), Some(amount), Some(currency)) if violations.is_empty() => {
                Ok(ValidClaimFields {
                    description,
                    category: non_blank(self.category.as_deref()),
                    amount,
                    currency,
                    receipt_ref: non_blank(self.receipt_ref.as_deref()),
                    remarks: non_blank(self.remarks.as_deref()),
                })
            }
            _ => Err(violations),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(ToOwned::to_owned)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionWarning {
    /// The employee has no workflow definition; the claim was kept as a draft.
    NoWorkflowDefinition,
}

impl SubmissionWarning {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoWorkflowDefinition => {
                "no approval workflow is defined for this employee; the claim was saved as a draft"
            }
        }
    }
}

/// Result of a submission. A draft with a warning is a successful outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub claim: Claim,
    pub approval_steps_created: u32,
    pub warning: Option<SubmissionWarning>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub employee_id: EmployeeId,
    pub description: String,
    pub category: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub receipt_ref: Option<String>,
    pub remarks: Option<String>,
    pub status: ClaimStatus,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{AmountInput, ClaimFields, ClaimStatus};

    fn valid_fields() -> ClaimFields {
        ClaimFields {
            description: Some("Client dinner".to_string()),
            category: Some("meals".to_string()),
            amount: Some(AmountInput::Text("120.50".to_string())),
            currency: Some("usd".to_string()),
            receipt_ref: None,
            remarks: Some("  ".to_string()),
        }
    }

    #[test]
    fn valid_fields_are_normalized() {
        let valid = valid_fields().validate().expect("fields should validate");

        assert_eq!(valid.description, "Client dinner");
        assert_eq!(valid.amount, Decimal::new(12050, 2));
        assert_eq!(valid.currency, "USD");
        assert_eq!(valid.remarks, None);
    }

    #[test]
    fn json_number_amount_is_accepted() {
        let fields: ClaimFields = serde_json::from_str(
            r#"{"description":"Taxi","amount":42.5,"currency":"EUR"}"#,
        )
        .expect("payload should deserialize");

        let valid = fields.validate().expect("fields should validate");
        assert_eq!(valid.amount, Decimal::new(425, 1));
    }

    #[test]
    fn every_violation_is_reported() {
        let fields = ClaimFields {
            description: Some("   ".to_string()),
            amount: Some(AmountInput::Text("-3".to_string())),
            currency: Some("DOLLARS".to_string()),
            ..ClaimFields::default()
        };

        let violations = fields.validate().expect_err("fields should be rejected");
        let offending: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();

        assert_eq!(offending, vec!["description", "amount", "currency"]);
    }

    #[test]
    fn zero_and_non_numeric_amounts_are_rejected() {
        for raw in ["0", "0.00", "abc", ""] {
            let fields = ClaimFields {
                amount: Some(AmountInput::Text(raw.to_string())),
                ..valid_fields()
            };
            let violations = fields.validate().expect_err("amount should be rejected");
            assert_eq!(violations.len(), 1, "amount `{raw}`");
            assert_eq!(violations[0].field, "amount");
        }
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let violations = ClaimFields::default().validate().expect_err("empty payload");
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn only_pending_claims_can_move() {
        assert!(ClaimStatus::Pending.can_transition_to(ClaimStatus::Approved));
        assert!(ClaimStatus::Pending.can_transition_to(ClaimStatus::Rejected));
        assert!(ClaimStatus::Pending.can_transition_to(ClaimStatus::Draft));
        assert!(!ClaimStatus::Draft.can_transition_to(ClaimStatus::Pending));
        assert!(!ClaimStatus::Approved.can_transition_to(ClaimStatus::Rejected));
        assert!(!ClaimStatus::Rejected.can_transition_to(ClaimStatus::Approved));
    }
}
