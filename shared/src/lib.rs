use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A calendar month reference (year + month, no day component).
///
/// This is the navigation unit for the whole engine: rates, submissions and
/// payroll totals are all scoped to a `MonthRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthRef {
    pub year: i32,
    pub month: u32,
}

impl Default for MonthRef {
    fn default() -> Self {
        let now = chrono::Local::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }
}

impl MonthRef {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// First day of the month, used as the persisted month key.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Shift by whole months, crossing year boundaries as needed.
    pub fn shifted(&self, delta: i32) -> Self {
        let zero_based = self.year * 12 + self.month as i32 - 1 + delta;
        Self {
            year: zero_based.div_euclid(12),
            month: zero_based.rem_euclid(12) as u32 + 1,
        }
    }

    /// Whether `date` falls inside this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl std::fmt::Display for MonthRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Category of a recorded visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// Ordinary day attendance, legal on every weekday.
    Day,
    /// Periodic full inventory count, legal only on Friday and Saturday.
    FullInventory,
}

/// Kind of a manual monetary adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentKind {
    /// Free-form monetary note (positive or negative).
    Note,
    /// Receipt-gated reimbursement.
    Reimbursement,
}

/// A typed operator action the engine can act on.
///
/// The transport layer (chat, buttons, whatever) translates its surface into
/// these and renders the returned [`RenderModel`]; the engine never sees the
/// transport itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    SelectPoint(String),
    SelectMonth { year: i32, month: u32 },
    /// Move the selected month forward/backward by `delta` months.
    NavigateMonth(i32),
    /// Tap on a calendar day. Mon-Thu and Sunday toggle the day slot
    /// directly; Friday and Saturday open the slot-choice menu.
    SelectDay(NaiveDate),
    /// Explicit slot toggle, used from the Friday/Saturday slot menu.
    ToggleSlot { date: NaiveDate, kind: SlotKind },
    /// Leave the slot-choice menu (or an adjustment draft) without mutating.
    Back,
    RequestAdjustment {
        kind: AdjustmentKind,
        amount: i64,
        memo: String,
    },
    /// Attach a receipt reference to the in-progress reimbursement.
    AttachReceipt(String),
    /// Abort the in-progress reimbursement draft, deleting it.
    CancelAdjustment,
    Submit,
}

/// What the calendar view should show in place of a plain month grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ViewMode {
    Calendar,
    /// Friday/Saturday slot-choice menu for the given date.
    SlotChoice(NaiveDate),
    /// A reimbursement was created and is waiting for its receipt.
    AwaitingReceipt,
}

/// Resolved pay rates for the selected point and month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatesView {
    pub rate_with_supply: i64,
    pub rate_without_supply: i64,
    pub rate_inventory: i64,
    pub coffee_bonus_enabled: bool,
    pub pay_under_five_boxes: bool,
}

/// One day of the selected point's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub box_count: i64,
    /// Policy-adjusted supply flag (box count + pay-under-five rule).
    pub effective_supply: bool,
    /// Slots the session's merchant has recorded on this date.
    pub own_slots: Vec<SlotKind>,
}

/// Per-point payroll breakdown for the selected month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTotalView {
    pub total: i64,
    pub day_visits: i64,
    pub supplied_day_visits: i64,
    pub inventory_visits: i64,
    pub coffee_bonus: i64,
    pub adjustments_total: i64,
    /// Confirmed reimbursements still missing a receipt reference.
    pub reimbursements_missing_receipt: i64,
}

/// Submission status for the session's merchant and selected month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionView {
    /// RFC 3339 timestamp of the one-time submit.
    pub submitted_at: String,
    /// Set when any ledger mutation happened after the submit.
    pub changed_after_submit: bool,
}

/// Everything the transport needs to redraw the operator's screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderModel {
    pub point_code: Option<String>,
    pub month: MonthRef,
    pub mode: ViewMode,
    pub days: Vec<DayCell>,
    pub rates: Option<RatesView>,
    pub point_total: Option<PointTotalView>,
    pub overall_total: i64,
    pub submission: Option<SubmissionView>,
    /// Guided user message (no-supply gate, receipt prompts, ...).
    pub notice: Option<String>,
}

/// Parsed roster row handed over by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantRow {
    pub name: String,
    /// 4-digit login secret, still in the clear at this point.
    pub secret: String,
    pub territory_tag: String,
}

/// Parsed supply-calendar row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyRow {
    pub point_code: String,
    pub date: NaiveDate,
    pub box_count: i64,
}

/// Parsed rate-table row. Applies to the month the upload targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub point_code: String,
    pub rate_with_supply: i64,
    pub rate_without_supply: i64,
    pub rate_inventory: i64,
    pub coffee_enabled: bool,
    pub pay_under_five: bool,
}
