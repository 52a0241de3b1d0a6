//! Outbound notification seam.
//!
//! The engine only ever says "tell this audience this text"; how the message
//! actually reaches anyone lives behind the [`Notifier`] trait, the same way
//! storage backends sit behind traits elsewhere. Delivery is fire-and-forget:
//! implementations swallow their own failures and never surface them back
//! into the mutation that triggered the message.

use tracing::info;

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every configured administrator.
    AllAdmins,
    /// One specific merchant, by merchant id.
    Merchant(String),
    /// The administrator responsible for a territory tag.
    TerritoryAdmin(String),
}

/// Fire-and-forget outbound messaging.
pub trait Notifier: Send + Sync {
    fn notify(&self, audience: Audience, message: &str);
}

/// Notifier that writes deliveries to the log.
///
/// Stands in for the real transport-layer sender during development and in
/// deployments without one configured.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, audience: Audience, message: &str) {
        info!(?audience, %message, "notification");
    }
}
