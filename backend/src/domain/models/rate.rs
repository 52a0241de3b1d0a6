//! Pay rates for a point in a given month.
use serde::{Deserialize, Serialize};

/// Per-visit coffee bonus, paid on day slots when enabled for the point.
pub const COFFEE_BONUS: i64 = 100;

pub const DEFAULT_RATE_WITH_SUPPLY: i64 = 800;
pub const DEFAULT_RATE_WITHOUT_SUPPLY: i64 = 400;
pub const DEFAULT_RATE_INVENTORY: i64 = 400;

/// Resolved rates and policy flags for one point+month.
///
/// A stored override replaces every field at once; there are no partial
/// overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rates {
    pub rate_with_supply: i64,
    pub rate_without_supply: i64,
    pub rate_inventory: i64,
    pub coffee_bonus_enabled: bool,
    /// When set, a day with any boxes at all counts as supplied even below
    /// the five-box threshold.
    pub pay_under_five_boxes: bool,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            rate_with_supply: DEFAULT_RATE_WITH_SUPPLY,
            rate_without_supply: DEFAULT_RATE_WITHOUT_SUPPLY,
            rate_inventory: DEFAULT_RATE_INVENTORY,
            coffee_bonus_enabled: false,
            pay_under_five_boxes: false,
        }
    }
}
