//! Domain model for a recorded visit and its slot kind.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// Ordinary day attendance.
    Day,
    /// Full inventory count, Friday/Saturday only.
    FullInventory,
}

impl SlotKind {
    /// Stable text encoding used in the visits table.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Day => "DAY",
            SlotKind::FullInventory => "FULL_INVENTORY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DAY" => Some(SlotKind::Day),
            "FULL_INVENTORY" => Some(SlotKind::FullInventory),
            _ => None,
        }
    }
}

/// One merchant working one point on one date under one slot kind.
///
/// The same date may carry both slot kinds for the same merchant; each is
/// priced independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub merchant_id: String,
    pub point_code: String,
    pub date: NaiveDate,
    pub slot_kind: SlotKind,
}
