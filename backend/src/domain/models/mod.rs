//! Domain entities persisted by the engine.

pub mod adjustment;
pub mod merchant;
pub mod rate;
pub mod submission;
pub mod supply;
pub mod visit;

pub use adjustment::{Adjustment, AdjustmentKind};
pub use merchant::Merchant;
pub use rate::Rates;
pub use submission::Submission;
pub use visit::{SlotKind, Visit};
