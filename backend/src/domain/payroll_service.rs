//! Payroll aggregation: turns the ledgers into money.
//!
//! Totals hold no stored state of their own; every call recomputes from the
//! visit, supply, rate and adjustment rows for the requested scope.

use chrono::NaiveDate;
use shared::MonthRef;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::errors::EngineResult;
use crate::domain::models::rate::COFFEE_BONUS;
use crate::domain::models::supply::SUPPLY_THRESHOLD_BOXES;
use crate::domain::models::SlotKind;
use crate::domain::rate_service::RateService;
use crate::domain::supply_service::{month_bounds, SupplyService};

/// Policy-adjusted supply flag used for day-slot pricing.
///
/// A day with zero boxes is never supplied; below the threshold it is
/// supplied only when the point pays under five boxes.
pub fn effective_has_supply(box_count: i64, pay_under_five: bool) -> bool {
    box_count > 0 && (pay_under_five || box_count >= SUPPLY_THRESHOLD_BOXES)
}

/// Per-point monthly total with its breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointTotal {
    pub total: i64,
    pub day_visits: i64,
    pub supplied_day_visits: i64,
    pub inventory_visits: i64,
    pub coffee_bonus: i64,
    pub adjustments_total: i64,
    /// Reimbursement rows still missing a receipt. Their amounts count in
    /// the total regardless; this only flags the incomplete paperwork.
    pub reimbursements_missing_receipt: i64,
}

#[derive(Clone)]
pub struct PayrollService {
    db: DbConnection,
    supply: SupplyService,
    rates: RateService,
}

impl PayrollService {
    pub fn new(db: DbConnection, supply: SupplyService, rates: RateService) -> Self {
        Self { db, supply, rates }
    }

    /// Monthly total for one merchant at one point.
    pub async fn per_point_total(
        &self,
        merchant_id: &str,
        point: &str,
        month: MonthRef,
    ) -> EngineResult<PointTotal> {
        let rates = self.rates.resolve(point, month).await?;
        let box_counts = self.supply.month_box_counts(point, month).await?;
        let (start, end) = month_bounds(month)?;

        let visit_rows = sqlx::query(
            "SELECT date, slot_kind FROM visits \
             WHERE merchant_id = ? AND point_code = ? AND date >= ? AND date < ?",
        )
        .bind(merchant_id)
        .bind(point)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;

        let mut breakdown = PointTotal::default();
        let mut total = 0i64;

        for row in visit_rows {
            let date: NaiveDate = row.get("date");
            let kind: String = row.get("slot_kind");
            match SlotKind::parse(&kind) {
                Some(SlotKind::Day) => {
                    breakdown.day_visits += 1;
                    let boxes = box_counts.get(&date).copied().unwrap_or(0);
                    if effective_has_supply(boxes, rates.pay_under_five_boxes) {
                        breakdown.supplied_day_visits += 1;
                        total += rates.rate_with_supply;
                    } else {
                        total += rates.rate_without_supply;
                    }
                }
                Some(SlotKind::FullInventory) => {
                    breakdown.inventory_visits += 1;
                    total += rates.rate_inventory;
                }
                None => {}
            }
        }

        if rates.coffee_bonus_enabled {
            breakdown.coffee_bonus = COFFEE_BONUS * breakdown.day_visits;
            total += breakdown.coffee_bonus;
        }

        let adjustment_rows = sqlx::query(
            "SELECT amount, kind, receipt_ref FROM adjustments \
             WHERE merchant_id = ? AND point_code = ? AND month_key = ?",
        )
        .bind(merchant_id)
        .bind(point)
        .bind(start)
        .fetch_all(self.db.pool())
        .await?;

        for row in adjustment_rows {
            let amount: i64 = row.get("amount");
            breakdown.adjustments_total += amount;
            total += amount;
            let kind: String = row.get("kind");
            let receipt: Option<String> = row.get("receipt_ref");
            if kind == "REIMBURSEMENT" && receipt.is_none() {
                breakdown.reimbursements_missing_receipt += 1;
            }
        }

        breakdown.total = total;
        Ok(breakdown)
    }

    /// Points that count toward the overall total: anywhere the merchant has
    /// a visit or an adjustment in the month.
    pub async fn active_points(
        &self,
        merchant_id: &str,
        month: MonthRef,
    ) -> EngineResult<Vec<String>> {
        let (start, end) = month_bounds(month)?;
        let rows = sqlx::query(
            "SELECT point_code FROM visits \
                 WHERE merchant_id = ?1 AND date >= ?2 AND date < ?3 \
             UNION \
             SELECT point_code FROM adjustments \
                 WHERE merchant_id = ?1 AND month_key = ?2 \
             ORDER BY point_code",
        )
        .bind(merchant_id)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.get("point_code")).collect())
    }

    /// Sum of per-point totals over the activity-derived point set.
    pub async fn overall_month_total(
        &self,
        merchant_id: &str,
        month: MonthRef,
    ) -> EngineResult<i64> {
        let mut sum = 0i64;
        for point in self.active_points(merchant_id, month).await? {
            sum += self.per_point_total(merchant_id, &point, month).await?.total;
        }
        Ok(sum)
    }
}
