//! Merchandiser attendance & payroll reconciliation engine.
//!
//! Tracks field-merchandiser visits against the supply calendar, prices each
//! month from per-point rates, carries manual adjustments, detects double
//! bookings and audits changes made after a merchant submits their month.
//! Transport, spreadsheet parsing and notification delivery live outside
//! this crate behind the types in `shared` and the [`notify::Notifier`]
//! trait.

pub mod db;
pub mod domain;
pub mod notify;

pub use db::DbConnection;
pub use domain::{Engine, EngineError, EngineResult, OperatorSession};
pub use notify::{Audience, LogNotifier, Notifier};
