//! Submission marker and post-submission change audit.

use chrono::Utc;
use shared::MonthRef;
use sqlx::Row;
use std::sync::Arc;
use tracing::info;

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::Submission;
use crate::domain::payroll_service::PayrollService;
use crate::notify::{Audience, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub created: bool,
}

#[derive(Clone)]
pub struct SubmissionService {
    db: DbConnection,
    payroll: PayrollService,
    notifier: Arc<dyn Notifier>,
}

impl SubmissionService {
    pub fn new(db: DbConnection, payroll: PayrollService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            payroll,
            notifier,
        }
    }

    pub async fn status(
        &self,
        merchant_id: &str,
        month: MonthRef,
    ) -> EngineResult<Option<Submission>> {
        let month_key = month_key(month)?;
        let row = sqlx::query(
            "SELECT merchant_id, month_key, submitted_at, last_change_after_submit_at \
             FROM submissions WHERE merchant_id = ? AND month_key = ?",
        )
        .bind(merchant_id)
        .bind(month_key)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|r| Submission {
            merchant_id: r.get("merchant_id"),
            month_key: r.get("month_key"),
            submitted_at: r.get("submitted_at"),
            last_change_after_submit_at: r.get("last_change_after_submit_at"),
        }))
    }

    /// One-time month submission. A second call is a no-op, not an error.
    pub async fn submit(&self, merchant_id: &str, month: MonthRef) -> EngineResult<SubmitOutcome> {
        let month_key = month_key(month)?;
        let created = sqlx::query(
            "INSERT OR IGNORE INTO submissions (merchant_id, month_key, submitted_at) \
             VALUES (?, ?, ?)",
        )
        .bind(merchant_id)
        .bind(month_key)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await?
        .rows_affected()
            > 0;

        if created {
            info!(merchant_id, month = %month, "month submitted");
        }
        Ok(SubmitOutcome { created })
    }

    /// Record that a ledger mutation happened for this merchant+month.
    ///
    /// Before submission this is a silent no-op. After submission it stamps
    /// `last_change_after_submit_at` and tells the admins what changed,
    /// together with the freshly recomputed month total.
    pub async fn touch(
        &self,
        merchant_id: &str,
        month: MonthRef,
        description: &str,
    ) -> EngineResult<()> {
        let month_key = month_key(month)?;
        let stamped = sqlx::query(
            "UPDATE submissions SET last_change_after_submit_at = ? \
             WHERE merchant_id = ? AND month_key = ?",
        )
        .bind(Utc::now())
        .bind(merchant_id)
        .bind(month_key)
        .execute(self.db.pool())
        .await?
        .rows_affected()
            > 0;

        if !stamped {
            return Ok(());
        }

        let total = self.payroll.overall_month_total(merchant_id, month).await?;
        let name = self.merchant_name(merchant_id).await?;
        self.notifier.notify(
            Audience::AllAdmins,
            &format!(
                "Change after submission: {name}, {month}: {description}. \
                 Recomputed month total: {total}"
            ),
        );
        Ok(())
    }

    async fn merchant_name(&self, merchant_id: &str) -> EngineResult<String> {
        let row = sqlx::query("SELECT display_name FROM merchants WHERE id = ?")
            .bind(merchant_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row
            .map(|r| r.get("display_name"))
            .unwrap_or_else(|| merchant_id.to_string()))
    }
}

fn month_key(month: MonthRef) -> EngineResult<chrono::NaiveDate> {
    month
        .first_day()
        .ok_or_else(|| EngineError::MalformedDate(month.to_string()))
}
