//! Bulk alert dispatch: one message, many contacts, strictly in order.
//!
//! [`DispatchEngine::dispatch`] walks the targets sequentially. A failure
//! for one target is recorded and the batch moves on. After each target
//! that reached the transport, a history entry is appended to the contact
//! store on a best-effort basis.

pub mod phone;
pub mod report;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::{self, CancelSignal};
use crate::contacts::store::ContactStore;
use crate::contacts::{Contact, HistoryEntry, HistoryKind};

use self::phone::normalize_phone;
use self::transport::{MessagingTransport, TransportError};

/// Lower bound for the pause between two sends.
pub const MIN_INTER_SEND_DELAY_MS: u64 = 500;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Message payload for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    /// SMS body sent to every target.
    pub text: String,
    /// History payload recorded for each target the transport was asked to
    /// deliver to. `None` records nothing.
    pub history: Option<HistoryKind>,
}

impl AlertMessage {
    /// A text message recorded as an SMS history entry.
    pub fn sms(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            history: Some(HistoryKind::Sms {
                message: text.clone(),
            }),
            text,
        }
    }
}

/// Stage of a single target within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// The send is about to start.
    Sending,
    /// The send finished (successfully or not).
    Sent,
}

/// Progress report emitted twice per target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchProgress {
    /// 1-based position of the target in the batch.
    pub current: usize,
    /// Batch size.
    pub total: usize,
    /// Name of the contact being processed.
    pub contact_name: String,
    /// Stage reached.
    pub status: ProgressStatus,
}

/// Progress callback invoked from the dispatch loop.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(&DispatchProgress) + Send);

/// Why a single dispatch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DispatchFailure {
    /// The phone number does not have 10 to 15 digits.
    #[error("invalid phone number")]
    InvalidPhoneNumber,
    /// Sending SMS is not permitted.
    #[error("SMS permission denied")]
    PermissionDenied,
    /// The transport did not accept the message.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

impl From<TransportError> for DispatchFailure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PermissionDenied => Self::PermissionDenied,
            TransportError::DeliveryFailed(reason) => Self::DeliveryFailed(reason),
        }
    }
}

/// Result of one dispatch to one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Target contact id.
    pub contact_id: String,
    /// Target contact name.
    pub contact_name: String,
    /// Normalized phone digits, when the number was valid.
    pub phone: Option<String>,
    /// Whether the transport accepted the message.
    pub success: bool,
    /// Failure reason when `success` is false.
    pub error: Option<DispatchFailure>,
}

/// Errors that stop a batch as a whole.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The message body is empty; nothing was sent.
    #[error("message cannot be empty")]
    EmptyMessage,

    /// The caller cancelled; `outcomes` covers the targets already handled.
    #[error("dispatch cancelled after {} targets", .outcomes.len())]
    Cancelled {
        /// Outcomes recorded before cancellation.
        outcomes: Vec<DispatchOutcome>,
    },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Sends one message to a batch of contacts.
pub struct DispatchEngine {
    transport: Arc<dyn MessagingTransport>,
    contacts: Arc<ContactStore>,
    inter_send_delay: Duration,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("inter_send_delay", &self.inter_send_delay)
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Create an engine. `inter_send_delay_ms` is raised to
    /// [`MIN_INTER_SEND_DELAY_MS`] if lower.
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        contacts: Arc<ContactStore>,
        inter_send_delay_ms: u64,
    ) -> Self {
        Self {
            transport,
            contacts,
            inter_send_delay: Duration::from_millis(
                inter_send_delay_ms.max(MIN_INTER_SEND_DELAY_MS),
            ),
        }
    }

    /// Effective pause between sends.
    pub fn inter_send_delay(&self) -> Duration {
        self.inter_send_delay
    }

    /// Send `message` to every target, in order, one at a time.
    ///
    /// Returns one outcome per target in target order. For each target the
    /// progress callback sees `Sending` then `Sent`. Targets whose phone
    /// number fails normalization are failed locally without touching the
    /// transport. History appends never change a recorded outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyMessage`] for a blank body, or
    /// [`DispatchError::Cancelled`] if `cancel` fires between targets.
    pub async fn dispatch(
        &self,
        targets: &[Contact],
        message: &AlertMessage,
        mut on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancelSignal>,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        if message.text.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }

        let total = targets.len();
        let mut outcomes = Vec::with_capacity(total);
        info!(total, "dispatch started");

        for (index, target) in targets.iter().enumerate() {
            if cancel::is_cancelled(cancel) {
                info!(completed = outcomes.len(), total, "dispatch cancelled");
                return Err(DispatchError::Cancelled { outcomes });
            }

            let current = index.saturating_add(1);
            let mut emit = |status| {
                if let Some(callback) = on_progress.as_mut() {
                    callback(&DispatchProgress {
                        current,
                        total,
                        contact_name: target.name.clone(),
                        status,
                    });
                }
            };

            emit(ProgressStatus::Sending);
            let outcome = self.send_one(target, message).await;
            emit(ProgressStatus::Sent);
            outcomes.push(outcome);

            if current < total {
                tokio::time::sleep(self.inter_send_delay).await;
            }
        }

        let failed = outcomes.iter().filter(|o| !o.success).count();
        info!(total, failed, "dispatch finished");
        Ok(outcomes)
    }

    async fn send_one(&self, target: &Contact, message: &AlertMessage) -> DispatchOutcome {
        let Some(digits) = normalize_phone(&target.phone) else {
            warn!(contact_id = %target.id, "invalid phone number, skipping send");
            return DispatchOutcome {
                contact_id: target.id.clone(),
                contact_name: target.name.clone(),
                phone: None,
                success: false,
                error: Some(DispatchFailure::InvalidPhoneNumber),
            };
        };

        let result = self.transport.send(&digits, &message.text).await;
        let error = match result {
            Ok(()) => {
                debug!(contact_id = %target.id, "message sent");
                None
            }
            Err(e) => {
                warn!(contact_id = %target.id, error = %e, "message send failed");
                Some(DispatchFailure::from(e))
            }
        };
        let success = error.is_none();

        if let Some(kind) = &message.history {
            self.record_history(&target.id, kind, success).await;
        }

        DispatchOutcome {
            contact_id: target.id.clone(),
            contact_name: target.name.clone(),
            phone: Some(digits),
            success,
            error,
        }
    }

    async fn record_history(&self, contact_id: &str, kind: &HistoryKind, delivered: bool) {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            delivered,
            kind: kind.clone(),
        };
        if let Err(e) = self.contacts.append_history(contact_id, entry).await {
            warn!(contact_id, error = %e, "failed to record history, ignoring");
        }
    }
}
