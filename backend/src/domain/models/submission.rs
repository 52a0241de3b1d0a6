//! Domain model for a merchant's monthly submission marker.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One-time "my month is final" declaration.
///
/// Submitting never locks the data; it only arms the post-submission audit,
/// which stamps `last_change_after_submit_at` on every later mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub merchant_id: String,
    pub month_key: NaiveDate,
    pub submitted_at: DateTime<Utc>,
    /// Monotonically advanced, never cleared.
    pub last_change_after_submit_at: Option<DateTime<Utc>>,
}
