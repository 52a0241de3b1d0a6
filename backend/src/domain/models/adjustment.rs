//! Domain model for a manual monetary adjustment.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentKind {
    Note,
    Reimbursement,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::Note => "NOTE",
            AdjustmentKind::Reimbursement => "REIMBURSEMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOTE" => Some(AdjustmentKind::Note),
            "REIMBURSEMENT" => Some(AdjustmentKind::Reimbursement),
            _ => None,
        }
    }
}

/// Append-only monetary line item scoped to merchant+point+month.
///
/// Rows are only ever created (and a reimbursement draft deleted on
/// cancellation); amounts and memos are never edited after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: String,
    pub merchant_id: String,
    pub point_code: String,
    pub month_key: chrono::NaiveDate,
    /// Signed; negative amounts are deductions.
    pub amount: i64,
    pub memo: String,
    pub kind: AdjustmentKind,
    /// Required eventually for reimbursements; a confirmed reimbursement
    /// without one is valid but flagged incomplete in reports.
    pub receipt_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Adjustment {
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn missing_receipt(&self) -> bool {
        self.kind == AdjustmentKind::Reimbursement && self.receipt_ref.is_none()
    }
}
