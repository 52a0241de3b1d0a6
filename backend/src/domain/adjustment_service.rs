//! Adjustment ledger: notes and receipt-gated reimbursements.

use chrono::Utc;
use shared::MonthRef;
use sqlx::Row;

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::{Adjustment, AdjustmentKind};
use crate::domain::submission_service::SubmissionService;

/// Sane digit-count guard; amounts are plain money, not astronomy.
const MAX_AMOUNT: i64 = 9_999_999;

#[derive(Clone)]
pub struct AdjustmentService {
    db: DbConnection,
    submissions: SubmissionService,
}

impl AdjustmentService {
    pub fn new(db: DbConnection, submissions: SubmissionService) -> Self {
        Self { db, submissions }
    }

    /// Append a free-form monetary note. Returns the new row's id.
    pub async fn add_note(
        &self,
        merchant_id: &str,
        point: &str,
        month: MonthRef,
        amount: i64,
        memo: &str,
    ) -> EngineResult<String> {
        let id = self
            .insert(merchant_id, point, month, amount, memo, AdjustmentKind::Note)
            .await?;
        self.submissions
            .touch(merchant_id, month, &format!("note {amount:+} at {point} ({memo})"))
            .await?;
        Ok(id)
    }

    /// Append a reimbursement. The row is durable immediately; its receipt
    /// arrives later via [`attach_receipt`](Self::attach_receipt) and reports
    /// flag it as incomplete until then.
    pub async fn add_reimbursement(
        &self,
        merchant_id: &str,
        point: &str,
        month: MonthRef,
        amount: i64,
        memo: &str,
    ) -> EngineResult<String> {
        let id = self
            .insert(
                merchant_id,
                point,
                month,
                amount,
                memo,
                AdjustmentKind::Reimbursement,
            )
            .await?;
        self.submissions
            .touch(
                merchant_id,
                month,
                &format!("reimbursement {amount:+} at {point} ({memo})"),
            )
            .await?;
        Ok(id)
    }

    /// Attach the receipt reference, exactly once.
    ///
    /// Only reimbursements carry receipts; a note id is rejected. Returns
    /// `true` when this call set the receipt, `false` when one was already
    /// present (the stored reference never changes).
    pub async fn attach_receipt(&self, id: &str, receipt_ref: &str) -> EngineResult<bool> {
        let row = self.fetch(id).await?;
        if row.kind != AdjustmentKind::Reimbursement {
            return Err(EngineError::NotFound(format!("reimbursement {id}")));
        }

        let attached = sqlx::query(
            "UPDATE adjustments SET receipt_ref = ? \
             WHERE id = ? AND kind = 'REIMBURSEMENT' AND receipt_ref IS NULL",
        )
        .bind(receipt_ref)
        .bind(id)
        .execute(self.db.pool())
        .await?
        .rows_affected()
            > 0;

        if attached {
            let month = month_ref(row.month_key);
            self.submissions
                .touch(
                    &row.merchant_id,
                    month,
                    &format!("receipt attached to reimbursement at {}", row.point_code),
                )
                .await?;
        }
        Ok(attached)
    }

    /// Delete an in-progress reimbursement draft.
    ///
    /// Only rows without a receipt can be cancelled; once a receipt is
    /// attached the record is permanent like any other adjustment.
    pub async fn cancel_reimbursement(&self, id: &str) -> EngineResult<bool> {
        let row = self.fetch(id).await?;

        let deleted = sqlx::query(
            "DELETE FROM adjustments \
             WHERE id = ? AND kind = 'REIMBURSEMENT' AND receipt_ref IS NULL",
        )
        .bind(id)
        .execute(self.db.pool())
        .await?
        .rows_affected()
            > 0;

        if deleted {
            let month = month_ref(row.month_key);
            self.submissions
                .touch(
                    &row.merchant_id,
                    month,
                    &format!("reimbursement draft cancelled at {}", row.point_code),
                )
                .await?;
        }
        Ok(deleted)
    }

    /// All adjustments in scope, oldest first, for reporting.
    pub async fn list(
        &self,
        merchant_id: &str,
        point: &str,
        month: MonthRef,
    ) -> EngineResult<Vec<Adjustment>> {
        let month_key = month
            .first_day()
            .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;
        let rows = sqlx::query(
            "SELECT id, merchant_id, point_code, month_key, amount, memo, kind, \
                    receipt_ref, created_at \
             FROM adjustments \
             WHERE merchant_id = ? AND point_code = ? AND month_key = ? \
             ORDER BY created_at",
        )
        .bind(merchant_id)
        .bind(point)
        .bind(month_key)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_adjustment).collect())
    }

    async fn insert(
        &self,
        merchant_id: &str,
        point: &str,
        month: MonthRef,
        amount: i64,
        memo: &str,
        kind: AdjustmentKind,
    ) -> EngineResult<String> {
        if amount.abs() > MAX_AMOUNT {
            return Err(EngineError::MalformedAmount(amount.to_string()));
        }
        let month_key = month
            .first_day()
            .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;

        let id = Adjustment::generate_id();
        sqlx::query(
            "INSERT INTO adjustments \
                 (id, merchant_id, point_code, month_key, amount, memo, kind, receipt_ref, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)",
        )
        .bind(&id)
        .bind(merchant_id)
        .bind(point)
        .bind(month_key)
        .bind(amount)
        .bind(memo)
        .bind(kind.as_str())
        .bind(Utc::now())
        .execute(self.db.pool())
        .await?;

        Ok(id)
    }

    async fn fetch(&self, id: &str) -> EngineResult<Adjustment> {
        let row = sqlx::query(
            "SELECT id, merchant_id, point_code, month_key, amount, memo, kind, \
                    receipt_ref, created_at \
             FROM adjustments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("adjustment {id}")))?;

        Ok(row_to_adjustment(row))
    }
}

fn month_ref(month_key: chrono::NaiveDate) -> MonthRef {
    use chrono::Datelike;
    MonthRef::new(month_key.year(), month_key.month())
}

fn row_to_adjustment(row: sqlx::sqlite::SqliteRow) -> Adjustment {
    let kind: String = row.get("kind");
    Adjustment {
        id: row.get("id"),
        merchant_id: row.get("merchant_id"),
        point_code: row.get("point_code"),
        month_key: row.get("month_key"),
        amount: row.get("amount"),
        memo: row.get("memo"),
        kind: AdjustmentKind::parse(&kind).unwrap_or(AdjustmentKind::Note),
        receipt_ref: row.get("receipt_ref"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::TestServices;

    const MONTH: MonthRef = MonthRef {
        year: 2026,
        month: 3,
    };

    #[tokio::test]
    async fn notes_accept_negative_amounts_but_not_absurd_ones() {
        let s = TestServices::new().await;

        s.adjustments
            .add_note("m1", "P1", MONTH, -200, "shortage")
            .await
            .unwrap();

        let err = s
            .adjustments
            .add_note("m1", "P1", MONTH, 10_000_000, "typo")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedAmount(_)));

        let rows = s.adjustments.list("m1", "P1", MONTH).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, -200);
    }

    #[tokio::test]
    async fn receipt_attaches_exactly_once() {
        let s = TestServices::new().await;
        let id = s
            .adjustments
            .add_reimbursement("m1", "P1", MONTH, 350, "taxi")
            .await
            .unwrap();

        let rows = s.adjustments.list("m1", "P1", MONTH).await.unwrap();
        assert!(rows[0].missing_receipt());

        assert!(s.adjustments.attach_receipt(&id, "blob-1").await.unwrap());
        assert!(!s.adjustments.attach_receipt(&id, "blob-2").await.unwrap());

        let rows = s.adjustments.list("m1", "P1", MONTH).await.unwrap();
        assert_eq!(rows[0].receipt_ref.as_deref(), Some("blob-1"));
        assert!(!rows[0].missing_receipt());
    }

    #[tokio::test]
    async fn cancelling_a_draft_deletes_it_but_a_receipted_row_stays() {
        let s = TestServices::new().await;
        let draft = s
            .adjustments
            .add_reimbursement("m1", "P1", MONTH, 350, "taxi")
            .await
            .unwrap();
        assert!(s.adjustments.cancel_reimbursement(&draft).await.unwrap());
        assert!(s.adjustments.list("m1", "P1", MONTH).await.unwrap().is_empty());

        let kept = s
            .adjustments
            .add_reimbursement("m1", "P1", MONTH, 500, "parts")
            .await
            .unwrap();
        s.adjustments.attach_receipt(&kept, "blob-9").await.unwrap();
        assert!(!s.adjustments.cancel_reimbursement(&kept).await.unwrap());
        assert_eq!(s.adjustments.list("m1", "P1", MONTH).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn receipts_never_attach_to_plain_notes() {
        let s = TestServices::new().await;
        let note = s
            .adjustments
            .add_note("m1", "P1", MONTH, -200, "shortage")
            .await
            .unwrap();

        let err = s.adjustments.attach_receipt(&note, "blob-x").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let rows = s.adjustments.list("m1", "P1", MONTH).await.unwrap();
        assert_eq!(rows[0].receipt_ref, None);
    }

    #[tokio::test]
    async fn attach_to_unknown_id_is_not_found() {
        let s = TestServices::new().await;
        let err = s.adjustments.attach_receipt("nope", "blob").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
