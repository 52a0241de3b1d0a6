//! Visit ledger, slot state machine and double-booking detection.

use chrono::{Datelike, NaiveDate, Weekday};
use shared::MonthRef;
use sqlx::Row;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::DbConnection;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::identity_service::{row_to_merchant, IdentityService};
use crate::domain::models::{Merchant, SlotKind, Visit};
use crate::domain::submission_service::SubmissionService;
use crate::domain::supply_service::month_bounds;
use crate::notify::{Audience, Notifier};

/// How tapping a calendar day behaves, by weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayEntry {
    /// Mon-Thu and Sunday: tap toggles the day slot directly.
    Direct,
    /// Friday and Saturday: tap opens the day/inventory slot menu.
    SlotMenu,
}

pub fn classify_day(weekday: Weekday) -> DayEntry {
    match weekday {
        Weekday::Fri | Weekday::Sat => DayEntry::SlotMenu,
        _ => DayEntry::Direct,
    }
}

/// Result of a toggle; exactly one flag is set on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub was_added: bool,
    pub was_removed: bool,
}

#[derive(Clone)]
pub struct VisitService {
    db: DbConnection,
    identity: IdentityService,
    submissions: SubmissionService,
    notifier: Arc<dyn Notifier>,
}

impl VisitService {
    pub fn new(
        db: DbConnection,
        identity: IdentityService,
        submissions: SubmissionService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            identity,
            submissions,
            notifier,
        }
    }

    /// Insert-if-absent / delete-if-present for one visit row.
    ///
    /// The delete-else-insert runs in a single transaction against the
    /// table's primary key, so two concurrent toggles on the same key
    /// resolve to one winner. An addition triggers the collision check and
    /// every successful call touches the submission audit.
    pub async fn toggle(
        &self,
        merchant_id: &str,
        point: &str,
        date: NaiveDate,
        kind: SlotKind,
    ) -> EngineResult<ToggleOutcome> {
        if kind == SlotKind::FullInventory && classify_day(date.weekday()) != DayEntry::SlotMenu {
            return Err(EngineError::IllegalSlotForWeekday(date));
        }

        let mut tx = self.db.pool().begin().await?;
        let removed = sqlx::query(
            "DELETE FROM visits \
             WHERE merchant_id = ? AND point_code = ? AND date = ? AND slot_kind = ?",
        )
        .bind(merchant_id)
        .bind(point)
        .bind(date)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let mut added = false;
        if !removed {
            added = sqlx::query(
                "INSERT OR IGNORE INTO visits (merchant_id, point_code, date, slot_kind) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(merchant_id)
            .bind(point)
            .bind(date)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;
        }
        tx.commit().await?;

        info!(merchant_id, point, %date, kind = kind.as_str(), added, removed, "visit toggled");

        if added {
            self.report_collisions(merchant_id, point, date).await;
        }

        let action = if added { "recorded" } else { "removed" };
        self.submissions
            .touch(
                merchant_id,
                MonthRef::new(date.year(), date.month()),
                &format!("{} slot {} at {point} on {date}", action, kind.as_str()),
            )
            .await?;

        Ok(ToggleOutcome {
            was_added: added,
            was_removed: removed,
        })
    }

    /// Other merchants with any slot kind recorded at the same point+date.
    pub async fn find_others(
        &self,
        point: &str,
        date: NaiveDate,
        excluding_merchant: &str,
    ) -> EngineResult<Vec<Merchant>> {
        let rows = sqlx::query(
            "SELECT DISTINCT m.id, m.display_name, m.normalized_name, m.secret_hash, \
                    m.operator_handle, m.territory_tag \
             FROM visits v JOIN merchants m ON m.id = v.merchant_id \
             WHERE v.point_code = ? AND v.date = ? AND v.merchant_id != ? \
             ORDER BY m.display_name",
        )
        .bind(point)
        .bind(date)
        .bind(excluding_merchant)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_merchant).collect())
    }

    /// Visits of one merchant at one point across a month.
    pub async fn visits_in_month(
        &self,
        merchant_id: &str,
        point: &str,
        month: MonthRef,
    ) -> EngineResult<Vec<Visit>> {
        let (start, end) = month_bounds(month)?;
        let rows = sqlx::query(
            "SELECT date, slot_kind FROM visits \
             WHERE merchant_id = ? AND point_code = ? AND date >= ? AND date < ? \
             ORDER BY date",
        )
        .bind(merchant_id)
        .bind(point)
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let kind: String = r.get("slot_kind");
                Some(Visit {
                    merchant_id: merchant_id.to_string(),
                    point_code: point.to_string(),
                    date: r.get("date"),
                    slot_kind: SlotKind::parse(&kind)?,
                })
            })
            .collect())
    }

    /// Best-effort double-booking alarm. Never fails the triggering toggle.
    async fn report_collisions(&self, merchant_id: &str, point: &str, date: NaiveDate) {
        let others = match self.find_others(point, date, merchant_id).await {
            Ok(others) => others,
            Err(e) => {
                warn!(point, %date, error = %e, "collision check failed");
                return;
            }
        };
        if others.is_empty() {
            return;
        }

        let actor = match self.identity.find_by_id(merchant_id).await {
            Ok(Some(actor)) => actor,
            _ => return,
        };
        let names: Vec<&str> = others.iter().map(|m| m.display_name.as_str()).collect();
        let summary = format!(
            "Double booking at {point} on {date}: {} (territory {}) overlaps with {}",
            actor.display_name,
            actor.territory_tag,
            names.join(", ")
        );

        self.notifier.notify(Audience::AllAdmins, &summary);
        if !actor.territory_tag.is_empty() {
            self.notifier
                .notify(Audience::TerritoryAdmin(actor.territory_tag.clone()), &summary);
        }
        for other in &others {
            self.notifier.notify(
                Audience::Merchant(other.id.clone()),
                &format!(
                    "{} also recorded a visit at {point} on {date}",
                    actor.display_name
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::TestServices;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn only_friday_and_saturday_open_the_slot_menu() {
        assert_eq!(classify_day(Weekday::Mon), DayEntry::Direct);
        assert_eq!(classify_day(Weekday::Thu), DayEntry::Direct);
        assert_eq!(classify_day(Weekday::Sun), DayEntry::Direct);
        assert_eq!(classify_day(Weekday::Fri), DayEntry::SlotMenu);
        assert_eq!(classify_day(Weekday::Sat), DayEntry::SlotMenu);
    }

    #[tokio::test]
    async fn toggle_twice_adds_then_removes_and_leaves_no_row() {
        let s = TestServices::new().await;
        let (m1, _) = s.two_merchants().await;
        let date = d(2026, 3, 2); // Monday

        let first = s.visits.toggle(&m1, "P1", date, SlotKind::Day).await.unwrap();
        assert!(first.was_added && !first.was_removed);

        let second = s.visits.toggle(&m1, "P1", date, SlotKind::Day).await.unwrap();
        assert!(second.was_removed && !second.was_added);

        let rows = s
            .visits
            .visits_in_month(&m1, "P1", MonthRef::new(2026, 3))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn inventory_slot_is_rejected_off_friday_saturday() {
        let s = TestServices::new().await;
        let (m1, _) = s.two_merchants().await;

        let monday = d(2026, 3, 2);
        let err = s
            .visits
            .toggle(&m1, "P1", monday, SlotKind::FullInventory)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::IllegalSlotForWeekday(_)));

        let friday = d(2026, 3, 6);
        let ok = s
            .visits
            .toggle(&m1, "P1", friday, SlotKind::FullInventory)
            .await
            .unwrap();
        assert!(ok.was_added);
    }

    #[tokio::test]
    async fn both_slot_kinds_coexist_on_the_same_date() {
        let s = TestServices::new().await;
        let (m1, _) = s.two_merchants().await;
        let friday = d(2026, 3, 6);

        s.visits.toggle(&m1, "P1", friday, SlotKind::Day).await.unwrap();
        s.visits
            .toggle(&m1, "P1", friday, SlotKind::FullInventory)
            .await
            .unwrap();

        let rows = s
            .visits
            .visits_in_month(&m1, "P1", MonthRef::new(2026, 3))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn second_merchant_on_same_point_and_date_raises_collision() {
        let s = TestServices::new().await;
        let (m1, m2) = s.two_merchants().await;
        let date = d(2026, 3, 2);

        s.visits.toggle(&m1, "P1", date, SlotKind::Day).await.unwrap();
        assert_eq!(s.notifier.count(), 0);

        s.visits.toggle(&m2, "P1", date, SlotKind::Day).await.unwrap();

        let admin_messages = s.notifier.messages_for(&Audience::AllAdmins);
        assert_eq!(admin_messages.len(), 1);
        assert!(admin_messages[0].contains("Анна"));
        let direct = s.notifier.messages_for(&Audience::Merchant(m1.clone()));
        assert_eq!(direct.len(), 1);
    }

    #[tokio::test]
    async fn removal_first_means_no_collision_for_the_next_merchant() {
        let s = TestServices::new().await;
        let (m1, m2) = s.two_merchants().await;
        let date = d(2026, 3, 2);

        s.visits.toggle(&m1, "P1", date, SlotKind::Day).await.unwrap();
        // m1 removes their visit before m2 arrives
        s.visits.toggle(&m1, "P1", date, SlotKind::Day).await.unwrap();
        s.visits.toggle(&m2, "P1", date, SlotKind::Day).await.unwrap();

        assert_eq!(s.notifier.count(), 0);
    }

    #[tokio::test]
    async fn removals_never_trigger_the_collision_check() {
        let s = TestServices::new().await;
        let (m1, m2) = s.two_merchants().await;
        let date = d(2026, 3, 2);

        s.visits.toggle(&m1, "P1", date, SlotKind::Day).await.unwrap();
        s.visits.toggle(&m2, "P1", date, SlotKind::Day).await.unwrap();
        let after_add = s.notifier.count();

        s.visits.toggle(&m2, "P1", date, SlotKind::Day).await.unwrap();
        assert_eq!(s.notifier.count(), after_add);
    }

    #[tokio::test]
    async fn post_submission_toggle_is_audited() {
        let s = TestServices::new().await;
        let (m1, _) = s.two_merchants().await;
        let month = MonthRef::new(2026, 3);

        s.submissions.submit(&m1, month).await.unwrap();
        s.visits
            .toggle(&m1, "P1", d(2026, 3, 2), SlotKind::Day)
            .await
            .unwrap();

        let status = s.submissions.status(&m1, month).await.unwrap().unwrap();
        assert!(status.last_change_after_submit_at.is_some());
        assert_eq!(s.notifier.messages_for(&Audience::AllAdmins).len(), 1);
    }
}
