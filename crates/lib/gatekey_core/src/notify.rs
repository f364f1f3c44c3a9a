//! Notification collaborator seam.
//!
//! Delivery (templating, SMTP/provider transport) lives outside this crate;
//! the engine only hands an address and template parameters across this
//! trait. Callers at the credential boundary treat sends as fire-and-forget.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Notification failures. Never escalated past a warning by this crate.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification send failed: {0}")]
    Send(String),
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to `address` with the given template
    /// parameters.
    async fn send(&self, address: &str, params: Value) -> Result<(), NotifyError>;
}

/// Default [`Notifier`] that only logs. Useful for local runs and as a
/// stand-in until a real delivery channel is wired up.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, address: &str, params: Value) -> Result<(), NotifyError> {
        info!(address, %params, "notification (logged only)");
        Ok(())
    }
}
