//! Rate resolver: per point+month overrides over compiled-in defaults.

use shared::MonthRef;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::Rates;

#[derive(Clone)]
pub struct RateService {
    db: DbConnection,
}

impl RateService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Resolve the rates for a point and month. A stored row replaces every
    /// field; absence means the system defaults.
    pub async fn resolve(&self, point: &str, month: MonthRef) -> EngineResult<Rates> {
        let month_key = month
            .first_day()
            .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;

        let row = sqlx::query(
            "SELECT rate_with_supply, rate_without_supply, rate_inventory, \
                    coffee_bonus_enabled, pay_under_five_boxes \
             FROM point_rates WHERE point_code = ? AND month_key = ?",
        )
        .bind(point)
        .bind(month_key)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(match row {
            Some(r) => Rates {
                rate_with_supply: r.get("rate_with_supply"),
                rate_without_supply: r.get("rate_without_supply"),
                rate_inventory: r.get("rate_inventory"),
                coffee_bonus_enabled: r.get("coffee_bonus_enabled"),
                pay_under_five_boxes: r.get("pay_under_five_boxes"),
            },
            None => Rates::default(),
        })
    }
}
