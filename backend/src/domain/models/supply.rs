//! Supply calendar constants.
//!
//! Supply rows live in the `supply_records` table and are only ever read as
//! per-date box counts; the ingestion-time `has_supply` flag is advisory and
//! pricing recomputes the effective flag with the point's pay-under-five
//! policy.

/// Box count threshold at which a delivery counts as real supply.
pub const SUPPLY_THRESHOLD_BOXES: i64 = 5;
