//! Pending confirmations for alerts that need a second user action.
//!
//! A prepared alert is parked here under a short base62 identifier until
//! the user confirms or declines it. Resolution is single-use.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::warn;

use crate::dispatch::AlertMessage;

/// Length of generated confirmation identifiers.
const CONFIRMATION_ID_LEN: usize = 8;

/// Base62 alphabet used for confirmation IDs.
const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Default confirmation expiry in seconds.
pub const DEFAULT_EXPIRY_SECS: i64 = 300;

/// Longest accepted confirmation expiry in seconds (one day).
pub const MAX_EXPIRY_SECS: i64 = 86_400;

/// An alert waiting for the user to confirm.
#[derive(Debug, Clone)]
pub struct PendingAlert {
    /// Short base62 identifier.
    pub id: String,
    /// Contact ids selected when the alert was prepared.
    pub contact_ids: Vec<String>,
    /// Message to dispatch on confirmation.
    pub message: AlertMessage,
    /// Prompt shown to the user.
    pub prompt: String,
    /// When the alert was prepared.
    pub created_at: DateTime<Utc>,
    /// When the alert expires.
    pub expires_at: DateTime<Utc>,
}

/// Result of taking a pending alert.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The alert is still valid and has been removed from the queue.
    Ready(PendingAlert),
    /// The alert expired before it was confirmed.
    Expired,
    /// No alert with that id.
    NotFound,
}

/// Holds alerts between preparation and confirmation.
///
/// Uses a sync [`Mutex`] since the critical section is brief (no awaits).
#[derive(Debug)]
pub struct ConfirmationQueue {
    pending: Mutex<HashMap<String, PendingAlert>>,
    expiry: Duration,
}

impl ConfirmationQueue {
    /// Create an empty queue whose entries live for `expiry_secs`.
    ///
    /// Values outside `1..=MAX_EXPIRY_SECS` fall back to
    /// [`DEFAULT_EXPIRY_SECS`].
    pub fn new(expiry_secs: i64) -> Self {
        let secs = if (1..=MAX_EXPIRY_SECS).contains(&expiry_secs) {
            expiry_secs
        } else {
            warn!(
                expiry_secs,
                fallback = DEFAULT_EXPIRY_SECS,
                "confirmation expiry out of range"
            );
            DEFAULT_EXPIRY_SECS
        };
        Self {
            pending: Mutex::new(HashMap::new()),
            expiry: Duration::try_seconds(secs).unwrap_or_else(Duration::zero),
        }
    }

    /// Park an alert and return the stored entry.
    pub fn park(&self, contact_ids: Vec<String>, message: AlertMessage, prompt: String) -> PendingAlert {
        let now = Utc::now();
        let pending = PendingAlert {
            id: generate_base62_id(),
            contact_ids,
            message,
            prompt,
            created_at: now,
            expires_at: now.checked_add_signed(self.expiry).unwrap_or(now),
        };

        if let Ok(mut map) = self.pending.lock() {
            map.insert(pending.id.clone(), pending.clone());
        }
        pending
    }

    /// Remove and return the alert with `id`.
    pub fn take(&self, id: &str) -> Resolution {
        self.take_at(id, Utc::now())
    }

    /// Remove and return the alert with `id`, judging expiry at `now`.
    pub fn take_at(&self, id: &str, now: DateTime<Utc>) -> Resolution {
        let Ok(mut map) = self.pending.lock() else {
            return Resolution::NotFound;
        };
        match map.remove(id) {
            None => Resolution::NotFound,
            Some(entry) if now > entry.expires_at => Resolution::Expired,
            Some(entry) => Resolution::Ready(entry),
        }
    }

    /// Drop the alert with `id`. Returns whether one was pending.
    pub fn discard(&self, id: &str) -> bool {
        self.pending
            .lock()
            .map(|mut map| map.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Remove all entries expired at `now`. Returns how many were dropped.
    pub fn gc_expired(&self, now: DateTime<Utc>) -> usize {
        let Ok(mut map) = self.pending.lock() else {
            return 0;
        };
        let before = map.len();
        map.retain(|_, v| v.expires_at >= now);
        before.saturating_sub(map.len())
    }

    /// Number of alerts awaiting confirmation.
    pub fn len(&self) -> usize {
        self.pending.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Whether no alerts are awaiting confirmation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConfirmationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_SECS)
    }
}

/// Generate an 8-character base62 identifier.
fn generate_base62_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CONFIRMATION_ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..BASE62_CHARS.len());
            char::from(BASE62_CHARS[idx])
        })
        .collect()
}
