//! Ingestion of parsed admin uploads (roster, supply calendar, rate table).
//!
//! The engine never parses spreadsheets itself; it receives validated rows
//! from the ingestion layer and applies each batch in a single transaction,
//! so a failed upload leaves no partially-imported file behind.

use shared::{MerchantRow, MonthRef, RateRow, SupplyRow};
use tracing::info;

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::identity_service::{hash_secret, normalize_name};
use crate::domain::models::supply::SUPPLY_THRESHOLD_BOXES;
use crate::domain::models::Merchant;

#[derive(Clone)]
pub struct IngestService {
    db: DbConnection,
}

impl IngestService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Upsert roster rows keyed by normalized name.
    ///
    /// Re-uploading a merchant refreshes display name, secret hash and
    /// territory tag but keeps an already-bound operator handle.
    pub async fn apply_roster(&self, rows: &[MerchantRow]) -> EngineResult<u64> {
        let mut tx = self.db.pool().begin().await?;

        for row in rows {
            let normalized = normalize_name(&row.name);
            sqlx::query(
                "INSERT INTO merchants \
                     (id, display_name, normalized_name, secret_hash, operator_handle, territory_tag) \
                 VALUES (?, ?, ?, ?, NULL, ?) \
                 ON CONFLICT(normalized_name) DO UPDATE SET \
                     display_name = excluded.display_name, \
                     secret_hash = excluded.secret_hash, \
                     territory_tag = excluded.territory_tag",
            )
            .bind(Merchant::generate_id())
            .bind(&row.name)
            .bind(&normalized)
            .bind(hash_secret(&normalized, &row.secret))
            .bind(&row.territory_tag)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(rows = rows.len(), "roster batch applied");
        Ok(rows.len() as u64)
    }

    /// Overwrite supply records from one uploaded calendar.
    ///
    /// A bad row fails the whole batch: the transaction is dropped and no
    /// earlier row of the file survives.
    pub async fn apply_supply(&self, rows: &[SupplyRow]) -> EngineResult<u64> {
        let mut tx = self.db.pool().begin().await?;

        for row in rows {
            if row.box_count < 0 {
                return Err(EngineError::MalformedAmount(row.box_count.to_string()));
            }
            sqlx::query(
                "INSERT OR REPLACE INTO supply_records (point_code, date, box_count, has_supply) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&row.point_code)
            .bind(row.date)
            .bind(row.box_count)
            .bind(row.box_count >= SUPPLY_THRESHOLD_BOXES)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(rows = rows.len(), "supply batch applied");
        Ok(rows.len() as u64)
    }

    /// Overwrite rate overrides for the month the upload targets.
    pub async fn apply_rates(&self, month: MonthRef, rows: &[RateRow]) -> EngineResult<u64> {
        let month_key = month
            .first_day()
            .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;
        let mut tx = self.db.pool().begin().await?;

        for row in rows {
            sqlx::query(
                "INSERT OR REPLACE INTO point_rates \
                     (point_code, month_key, rate_with_supply, rate_without_supply, \
                      rate_inventory, coffee_bonus_enabled, pay_under_five_boxes) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&row.point_code)
            .bind(month_key)
            .bind(row.rate_with_supply)
            .bind(row.rate_without_supply)
            .bind(row.rate_inventory)
            .bind(row.coffee_enabled)
            .bind(row.pay_under_five)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(rows = rows.len(), month = %month, "rate batch applied");
        Ok(rows.len() as u64)
    }
}
