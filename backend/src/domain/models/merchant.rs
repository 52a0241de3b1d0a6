//! Domain model for a merchant (field merchandiser).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub display_name: String,
    /// Identity key: two names that normalize equal are the same merchant.
    pub normalized_name: String,
    pub secret_hash: String,
    /// Set once at first successful login, immutable afterwards unless an
    /// admin clears it.
    pub operator_handle: Option<String>,
    /// Routes notifications to the responsible territory administrator.
    pub territory_tag: String,
}

impl Merchant {
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
