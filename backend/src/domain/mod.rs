//! Domain layer of the reconciliation & payroll engine.

pub mod adjustment_service;
pub mod errors;
pub mod identity_service;
pub mod ingest;
pub mod models;
pub mod payroll_service;
pub mod rate_service;
pub mod session;
pub mod submission_service;
pub mod supply_service;
pub mod visit_service;

pub use adjustment_service::AdjustmentService;
pub use errors::{EngineError, EngineResult};
pub use identity_service::IdentityService;
pub use ingest::IngestService;
pub use payroll_service::PayrollService;
pub use rate_service::RateService;
pub use session::{Engine, OperatorSession};
pub use submission_service::SubmissionService;
pub use supply_service::SupplyService;
pub use visit_service::VisitService;
