//! Verification event system.

use crate::store::{AttemptType, VerificationStatus};
use tokio::sync::broadcast;

/// Events emitted by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    /// A verification reached the provider and its outcome was recorded.
    AttemptCompleted {
        /// Store id.
        store_id: String,
        /// Bank or UPI.
        attempt_type: AttemptType,
        /// Resulting status.
        status: VerificationStatus,
    },

    /// A processing account was re-confirmed.
    RefreshCompleted {
        /// Store id.
        store_id: String,
        /// Status after the refresh.
        status: VerificationStatus,
    },

    /// The audit row could not be written.
    AuditWriteFailed {
        /// Store id.
        store_id: String,
        /// Error message.
        message: String,
    },

    /// The outcome could not be saved after the provider was contacted.
    PersistenceFailed {
        /// Store id.
        store_id: String,
        /// Provider validation id, for reconciliation.
        validation_id: Option<String>,
    },

    /// The provider was contacted but the daily counter could not be
    /// incremented.
    AttemptNotCounted {
        /// Store id.
        store_id: String,
        /// Bank or UPI.
        attempt_type: AttemptType,
        /// Provider validation id, for reconciliation.
        validation_id: String,
    },

    /// A request was refused because platform configuration is missing.
    ConfigurationMissing {
        /// What is missing.
        detail: String,
    },
}

/// Channel for receiving verification events.
pub type VerificationEventsChannel = broadcast::Receiver<VerificationEvent>;

/// Sender for verification events.
pub type VerificationEventsSender = broadcast::Sender<VerificationEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (VerificationEventsSender, VerificationEventsChannel) {
    broadcast::channel(256)
}
