use chrono::NaiveDate;
use thiserror::Error;

/// Expected, recoverable engine failures.
///
/// Everything here is a normal business outcome that the transport layer
/// turns into a guided user message; only [`EngineError::Db`] represents a
/// genuinely unexpected failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("merchant is already bound to a different operator handle")]
    AlreadyBoundToOther,

    #[error("full inventory slot is only allowed on Friday or Saturday, got {0}")]
    IllegalSlotForWeekday(NaiveDate),

    #[error("point {point} has no supply records in {month}; contact your supervisor")]
    NoSupplyInScope { point: String, month: String },

    #[error("a reimbursement needs a receipt before it can be finalized")]
    ReceiptRequired,

    #[error("malformed amount: {0}")]
    MalformedAmount(String),

    #[error("malformed date: {0}")]
    MalformedDate(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl EngineError {
    /// Whether this is an expected business condition (as opposed to an
    /// infrastructure failure the transport reports as "service
    /// unavailable").
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, EngineError::Db(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
