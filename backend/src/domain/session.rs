//! Operator sessions and intent dispatch.
//!
//! Each operator session owns an explicit [`OperatorSession`] value; there is
//! no ambient per-chat state anywhere else. The transport layer feeds typed
//! [`Intent`]s into [`Engine::handle`] and redraws from the returned
//! [`RenderModel`].

use chrono::{Datelike, Duration, NaiveDate};
use shared::{
    DayCell, Intent, MonthRef, PointTotalView, RatesView, RenderModel, SubmissionView, ViewMode,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::DbConnection;
use crate::domain::adjustment_service::AdjustmentService;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::identity_service::IdentityService;
use crate::domain::ingest::IngestService;
use crate::domain::models::{Rates, SlotKind};
use crate::domain::payroll_service::{effective_has_supply, PayrollService, PointTotal};
use crate::domain::rate_service::RateService;
use crate::domain::submission_service::SubmissionService;
use crate::domain::supply_service::SupplyService;
use crate::domain::visit_service::{classify_day, DayEntry, VisitService};
use crate::notify::Notifier;

/// Per-operator conversation state. Private to the session; holds no ledger
/// data of its own.
#[derive(Debug, Clone)]
pub struct OperatorSession {
    pub merchant_id: String,
    pub selected_point: Option<String>,
    pub selected_month: MonthRef,
    /// Friday/Saturday date awaiting a slot-kind decision.
    pub pending_day: Option<NaiveDate>,
    /// Reimbursement created in this session and still missing its receipt.
    pub pending_reimbursement: Option<String>,
}

impl OperatorSession {
    pub fn new(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            selected_point: None,
            selected_month: MonthRef::default(),
            pending_day: None,
            pending_reimbursement: None,
        }
    }
}

/// The reconciliation & payroll engine: all services wired over one
/// datastore connection and one notifier.
#[derive(Clone)]
pub struct Engine {
    pub identity: IdentityService,
    pub supply: SupplyService,
    pub rates: RateService,
    pub payroll: PayrollService,
    pub submissions: SubmissionService,
    pub visits: VisitService,
    pub adjustments: AdjustmentService,
    pub ingest: IngestService,
}

impl Engine {
    pub fn new(db: DbConnection, notifier: Arc<dyn Notifier>) -> Self {
        let identity = IdentityService::new(db.clone());
        let supply = SupplyService::new(db.clone());
        let rates = RateService::new(db.clone());
        let payroll = PayrollService::new(db.clone(), supply.clone(), rates.clone());
        let submissions = SubmissionService::new(db.clone(), payroll.clone(), notifier.clone());
        let visits = VisitService::new(
            db.clone(),
            identity.clone(),
            submissions.clone(),
            notifier.clone(),
        );
        let adjustments = AdjustmentService::new(db.clone(), submissions.clone());
        let ingest = IngestService::new(db);

        Self {
            identity,
            supply,
            rates,
            payroll,
            submissions,
            visits,
            adjustments,
            ingest,
        }
    }

    /// Apply one operator intent to the session, mutate the ledgers as
    /// needed and return the refreshed view.
    ///
    /// Expected business failures come back as [`EngineError`] variants the
    /// transport turns into guided messages; the session is left unchanged
    /// in that case.
    pub async fn handle(
        &self,
        session: &mut OperatorSession,
        intent: Intent,
    ) -> EngineResult<RenderModel> {
        match intent {
            Intent::SelectPoint(code) => {
                self.gate_supply(&code, session.selected_month).await?;
                session.selected_point = Some(code);
                session.pending_day = None;
                self.render(session, ViewMode::Calendar, None).await
            }
            Intent::SelectMonth { year, month } => {
                if !(1..=12).contains(&month) {
                    return Err(EngineError::MalformedDate(format!("{year}-{month}")));
                }
                self.switch_month(session, MonthRef::new(year, month)).await
            }
            Intent::NavigateMonth(delta) => {
                let target = session.selected_month.shifted(delta);
                self.switch_month(session, target).await
            }
            Intent::SelectDay(date) => {
                let point = self.selected_point(session)?;
                self.check_in_month(session, date)?;
                match classify_day(date.weekday()) {
                    DayEntry::Direct => {
                        self.visits
                            .toggle(&session.merchant_id, &point, date, SlotKind::Day)
                            .await?;
                        self.render(session, ViewMode::Calendar, None).await
                    }
                    DayEntry::SlotMenu => {
                        session.pending_day = Some(date);
                        self.render(session, ViewMode::SlotChoice(date), None).await
                    }
                }
            }
            Intent::ToggleSlot { date, kind } => {
                let point = self.selected_point(session)?;
                self.check_in_month(session, date)?;
                self.visits
                    .toggle(&session.merchant_id, &point, date, from_dto_slot(kind))
                    .await?;
                session.pending_day = None;
                self.render(session, ViewMode::Calendar, None).await
            }
            Intent::Back => {
                session.pending_day = None;
                let notice = if session.pending_reimbursement.take().is_some() {
                    Some("Reimbursement kept; its receipt is still missing".to_string())
                } else {
                    None
                };
                self.render(session, ViewMode::Calendar, notice).await
            }
            Intent::RequestAdjustment { kind, amount, memo } => {
                let point = self.selected_point(session)?;
                match kind {
                    shared::AdjustmentKind::Note => {
                        self.adjustments
                            .add_note(
                                &session.merchant_id,
                                &point,
                                session.selected_month,
                                amount,
                                &memo,
                            )
                            .await?;
                        self.render(
                            session,
                            ViewMode::Calendar,
                            Some("Note recorded".to_string()),
                        )
                        .await
                    }
                    shared::AdjustmentKind::Reimbursement => {
                        let id = self
                            .adjustments
                            .add_reimbursement(
                                &session.merchant_id,
                                &point,
                                session.selected_month,
                                amount,
                                &memo,
                            )
                            .await?;
                        session.pending_reimbursement = Some(id);
                        self.render(
                            session,
                            ViewMode::AwaitingReceipt,
                            Some("Attach the receipt to finish the reimbursement".to_string()),
                        )
                        .await
                    }
                }
            }
            Intent::AttachReceipt(blob_ref) => {
                let id = session
                    .pending_reimbursement
                    .clone()
                    .ok_or(EngineError::ReceiptRequired)?;
                let attached = self.adjustments.attach_receipt(&id, &blob_ref).await?;
                session.pending_reimbursement = None;
                let notice = if attached {
                    "Receipt attached"
                } else {
                    "A receipt was already attached to this reimbursement"
                };
                self.render(session, ViewMode::Calendar, Some(notice.to_string()))
                    .await
            }
            Intent::CancelAdjustment => {
                let notice = match session.pending_reimbursement.take() {
                    Some(id) => {
                        if self.adjustments.cancel_reimbursement(&id).await? {
                            "Reimbursement draft deleted"
                        } else {
                            "This reimbursement already has a receipt and stays on record"
                        }
                    }
                    None => "Nothing to cancel",
                };
                self.render(session, ViewMode::Calendar, Some(notice.to_string()))
                    .await
            }
            Intent::Submit => {
                let outcome = self
                    .submissions
                    .submit(&session.merchant_id, session.selected_month)
                    .await?;
                let notice = if outcome.created {
                    "Month submitted"
                } else {
                    "This month was already submitted"
                };
                self.render(session, ViewMode::Calendar, Some(notice.to_string()))
                    .await
            }
        }
    }

    async fn switch_month(
        &self,
        session: &mut OperatorSession,
        target: MonthRef,
    ) -> EngineResult<RenderModel> {
        if let Some(point) = &session.selected_point {
            self.gate_supply(point, target).await?;
        }
        session.selected_month = target;
        session.pending_day = None;
        self.render(session, ViewMode::Calendar, None).await
    }

    /// Calendar entry gate: no supply in the month means no calendar.
    async fn gate_supply(&self, point: &str, month: MonthRef) -> EngineResult<()> {
        if self.supply.has_any_supply_in_month(point, month).await? {
            Ok(())
        } else {
            Err(EngineError::NoSupplyInScope {
                point: point.to_string(),
                month: month.to_string(),
            })
        }
    }

    fn selected_point(&self, session: &OperatorSession) -> EngineResult<String> {
        session
            .selected_point
            .clone()
            .ok_or_else(|| EngineError::NotFound("no point selected".to_string()))
    }

    fn check_in_month(&self, session: &OperatorSession, date: NaiveDate) -> EngineResult<()> {
        if session.selected_month.contains(date) {
            Ok(())
        } else {
            Err(EngineError::MalformedDate(format!(
                "{date} is outside {}",
                session.selected_month
            )))
        }
    }

    /// Rebuild the full view for the session. Totals are recomputed on
    /// every call; nothing here is cached between intents.
    async fn render(
        &self,
        session: &OperatorSession,
        mode: ViewMode,
        notice: Option<String>,
    ) -> EngineResult<RenderModel> {
        let month = session.selected_month;
        let overall_total = self
            .payroll
            .overall_month_total(&session.merchant_id, month)
            .await?;
        let submission = self
            .submissions
            .status(&session.merchant_id, month)
            .await?
            .map(|s| SubmissionView {
                submitted_at: s.submitted_at.to_rfc3339(),
                changed_after_submit: s.last_change_after_submit_at.is_some(),
            });

        let (days, rates, point_total) = match &session.selected_point {
            Some(point) => {
                let rates = self.rates.resolve(point, month).await?;
                let box_counts = self.supply.month_box_counts(point, month).await?;
                let visits = self
                    .visits
                    .visits_in_month(&session.merchant_id, point, month)
                    .await?;
                let mut slots_by_day: HashMap<NaiveDate, Vec<shared::SlotKind>> = HashMap::new();
                for visit in visits {
                    slots_by_day
                        .entry(visit.date)
                        .or_default()
                        .push(to_dto_slot(visit.slot_kind));
                }

                let days = month_days(month)?
                    .into_iter()
                    .map(|date| {
                        let box_count = box_counts.get(&date).copied().unwrap_or(0);
                        DayCell {
                            date,
                            box_count,
                            effective_supply: effective_has_supply(
                                box_count,
                                rates.pay_under_five_boxes,
                            ),
                            own_slots: slots_by_day.remove(&date).unwrap_or_default(),
                        }
                    })
                    .collect();

                let totals = self
                    .payroll
                    .per_point_total(&session.merchant_id, point, month)
                    .await?;
                (days, Some(rates_view(rates)), Some(totals_view(totals)))
            }
            None => (Vec::new(), None, None),
        };

        Ok(RenderModel {
            point_code: session.selected_point.clone(),
            month,
            mode,
            days,
            rates,
            point_total,
            overall_total,
            submission,
            notice,
        })
    }
}

fn month_days(month: MonthRef) -> EngineResult<Vec<NaiveDate>> {
    let start = month
        .first_day()
        .ok_or_else(|| EngineError::MalformedDate(month.to_string()))?;
    let mut days = Vec::with_capacity(31);
    let mut day = start;
    while month.contains(day) {
        days.push(day);
        day = day + Duration::days(1);
    }
    Ok(days)
}

fn to_dto_slot(kind: SlotKind) -> shared::SlotKind {
    match kind {
        SlotKind::Day => shared::SlotKind::Day,
        SlotKind::FullInventory => shared::SlotKind::FullInventory,
    }
}

fn from_dto_slot(kind: shared::SlotKind) -> SlotKind {
    match kind {
        shared::SlotKind::Day => SlotKind::Day,
        shared::SlotKind::FullInventory => SlotKind::FullInventory,
    }
}

fn rates_view(rates: Rates) -> RatesView {
    RatesView {
        rate_with_supply: rates.rate_with_supply,
        rate_without_supply: rates.rate_without_supply,
        rate_inventory: rates.rate_inventory,
        coffee_bonus_enabled: rates.coffee_bonus_enabled,
        pay_under_five_boxes: rates.pay_under_five_boxes,
    }
}

fn totals_view(totals: PointTotal) -> PointTotalView {
    PointTotalView {
        total: totals.total,
        day_visits: totals.day_visits,
        supplied_day_visits: totals.supplied_day_visits,
        inventory_visits: totals.inventory_visits,
        coffee_bonus: totals.coffee_bonus,
        adjustments_total: totals.adjustments_total,
        reimbursements_missing_receipt: totals.reimbursements_missing_receipt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test_support::RecordingNotifier;
    use shared::SupplyRow;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn setup() -> (Engine, OperatorSession) {
        let db = DbConnection::init_test().await.expect("test db");
        let engine = Engine::new(db, Arc::new(RecordingNotifier::default()));

        engine
            .ingest
            .apply_roster(&[shared::MerchantRow {
                name: "Анна Ёлкина".to_string(),
                secret: "1234".to_string(),
                territory_tag: "north".to_string(),
            }])
            .await
            .expect("roster");
        let merchant = engine
            .identity
            .find_by_normalized_name("анна елкина")
            .await
            .expect("lookup")
            .expect("present");

        engine
            .ingest
            .apply_supply(&[SupplyRow {
                point_code: "P1".to_string(),
                date: d(2026, 3, 2),
                box_count: 7,
            }])
            .await
            .expect("supply");

        let mut session = OperatorSession::new(merchant.id);
        session.selected_month = MonthRef::new(2026, 3);
        (engine, session)
    }

    #[tokio::test]
    async fn selecting_an_unsupplied_point_is_gated() {
        let (engine, mut session) = setup().await;
        let err = engine
            .handle(&mut session, Intent::SelectPoint("P9".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSupplyInScope { .. }));
        assert!(session.selected_point.is_none());
    }

    #[tokio::test]
    async fn weekday_tap_toggles_directly_and_renders_totals() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();

        // Monday 2026-03-02, the supplied day
        let view = engine
            .handle(&mut session, Intent::SelectDay(d(2026, 3, 2)))
            .await
            .unwrap();
        assert_eq!(view.mode, ViewMode::Calendar);
        assert_eq!(view.point_total.unwrap().total, 800);
        assert_eq!(view.overall_total, 800);

        let cell = view.days.iter().find(|c| c.date == d(2026, 3, 2)).unwrap();
        assert!(cell.effective_supply);
        assert_eq!(cell.own_slots, vec![shared::SlotKind::Day]);
    }

    #[tokio::test]
    async fn friday_tap_opens_the_slot_menu_and_back_leaves_it() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();

        let friday = d(2026, 3, 6);
        let menu = engine
            .handle(&mut session, Intent::SelectDay(friday))
            .await
            .unwrap();
        assert_eq!(menu.mode, ViewMode::SlotChoice(friday));
        assert_eq!(session.pending_day, Some(friday));

        // Back returns to the calendar without recording anything
        let back = engine.handle(&mut session, Intent::Back).await.unwrap();
        assert_eq!(back.mode, ViewMode::Calendar);
        assert_eq!(back.overall_total, 0);
        assert!(session.pending_day.is_none());

        // Re-open and take the inventory slot this time
        engine
            .handle(&mut session, Intent::SelectDay(friday))
            .await
            .unwrap();
        let after = engine
            .handle(
                &mut session,
                Intent::ToggleSlot {
                    date: friday,
                    kind: shared::SlotKind::FullInventory,
                },
            )
            .await
            .unwrap();
        assert_eq!(after.mode, ViewMode::Calendar);
        assert_eq!(after.point_total.unwrap().inventory_visits, 1);
    }

    #[tokio::test]
    async fn dates_outside_the_selected_month_are_malformed() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();

        let err = engine
            .handle(&mut session, Intent::SelectDay(d(2026, 4, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedDate(_)));
    }

    #[tokio::test]
    async fn month_navigation_is_gated_by_supply_too() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();

        // April has no supply for P1
        let err = engine
            .handle(&mut session, Intent::NavigateMonth(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSupplyInScope { .. }));
        assert_eq!(session.selected_month, MonthRef::new(2026, 3));
    }

    #[tokio::test]
    async fn reimbursement_flow_awaits_receipt_then_completes() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();

        let view = engine
            .handle(
                &mut session,
                Intent::RequestAdjustment {
                    kind: shared::AdjustmentKind::Reimbursement,
                    amount: 350,
                    memo: "taxi".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(view.mode, ViewMode::AwaitingReceipt);
        assert_eq!(view.point_total.unwrap().reimbursements_missing_receipt, 1);

        let done = engine
            .handle(&mut session, Intent::AttachReceipt("blob-1".to_string()))
            .await
            .unwrap();
        assert_eq!(done.mode, ViewMode::Calendar);
        let totals = done.point_total.unwrap();
        assert_eq!(totals.reimbursements_missing_receipt, 0);
        assert_eq!(totals.total, 350);
    }

    #[tokio::test]
    async fn attach_receipt_without_a_draft_is_receipt_required() {
        let (engine, mut session) = setup().await;
        let err = engine
            .handle(&mut session, Intent::AttachReceipt("blob".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReceiptRequired));
    }

    #[tokio::test]
    async fn cancelling_a_draft_removes_it_from_the_totals() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();
        engine
            .handle(
                &mut session,
                Intent::RequestAdjustment {
                    kind: shared::AdjustmentKind::Reimbursement,
                    amount: 350,
                    memo: "taxi".to_string(),
                },
            )
            .await
            .unwrap();

        let view = engine
            .handle(&mut session, Intent::CancelAdjustment)
            .await
            .unwrap();
        assert_eq!(view.overall_total, 0);
        assert!(session.pending_reimbursement.is_none());
    }

    #[tokio::test]
    async fn submit_reports_idempotently_through_the_view() {
        let (engine, mut session) = setup().await;
        engine
            .handle(&mut session, Intent::SelectPoint("P1".to_string()))
            .await
            .unwrap();

        let first = engine.handle(&mut session, Intent::Submit).await.unwrap();
        assert_eq!(first.notice.as_deref(), Some("Month submitted"));
        assert!(first.submission.is_some());
        assert!(!first.submission.unwrap().changed_after_submit);

        let second = engine.handle(&mut session, Intent::Submit).await.unwrap();
        assert_eq!(
            second.notice.as_deref(),
            Some("This month was already submitted")
        );

        // A later toggle shows up as a post-submission change
        let after = engine
            .handle(&mut session, Intent::SelectDay(d(2026, 3, 2)))
            .await
            .unwrap();
        assert!(after.submission.unwrap().changed_after_submit);
    }
}
