pub mod approval;
pub mod claim;
pub mod employee;
pub mod workflow;

use uuid::Uuid;

/// Generates a prefixed opaque identifier, e.g. `CLM-3f2a9c01b7d4`.
pub fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &raw[..12])
}
