//! Supply ledger: box counts per point and date.

use std::collections::HashMap;

use chrono::NaiveDate;
use shared::MonthRef;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::supply::SUPPLY_THRESHOLD_BOXES;

#[derive(Clone)]
pub struct SupplyService {
    db: DbConnection,
}

impl SupplyService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Idempotent overwrite of the box count for one point and date.
    pub async fn upsert_box_count(
        &self,
        point: &str,
        date: NaiveDate,
        count: i64,
    ) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO supply_records (point_code, date, box_count, has_supply) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(point)
        .bind(date)
        .bind(count)
        .bind(count >= SUPPLY_THRESHOLD_BOXES)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Box count for a point and date, zero when no record exists.
    pub async fn box_count(&self, point: &str, date: NaiveDate) -> EngineResult<i64> {
        let row = sqlx::query(
            "SELECT box_count FROM supply_records WHERE point_code = ? AND date = ?",
        )
        .bind(point)
        .bind(date)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|r| r.get("box_count")).unwrap_or(0))
    }

    /// All box counts of a point within a month, keyed by date.
    pub async fn month_box_counts(
        &self,
        point: &str,
        month: MonthRef,
    ) -> EngineResult<HashMap<NaiveDate, i64>> {
        let (start, end) = month_bounds(month)?;
        let rows = sqlx::query(
            "SELECT date, box_count FROM supply_records \
             WHERE point_code = ? AND date >= ? AND date < ?",
        )
        .bind(point)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("date"), r.get("box_count")))
            .collect())
    }

    /// Calendar entry gate: a point without any supply record in the month
    /// must not be opened by an operator.
    pub async fn has_any_supply_in_month(&self, point: &str, month: MonthRef) -> EngineResult<bool> {
        let (start, end) = month_bounds(month)?;
        let row = sqlx::query(
            "SELECT 1 FROM supply_records WHERE point_code = ? AND date >= ? AND date < ? LIMIT 1",
        )
        .bind(point)
        .bind(start)
        .bind(end)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.is_some())
    }
}

/// Half-open [first day, first day of next month) range for SQL filters.
pub(crate) fn month_bounds(month: MonthRef) -> EngineResult<(NaiveDate, NaiveDate)> {
    let start = month
        .first_day()
        .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;
    let end = month
        .shifted(1)
        .first_day()
        .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;
    Ok((start, end))
}
