//! Trusted contacts and their append-only activity history.
//!
//! The whole contact collection is persisted as a single JSON document under
//! one key of a [`KeyValueStore`](kv::KeyValueStore). Every mutation rewrites
//! that document, so [`ContactStore`](store::ContactStore) funnels all
//! mutations through a single-writer actor.

pub mod kv;
pub mod store;

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use self::kv::KvError;

/// Default key under which the contact collection is persisted.
pub const DEFAULT_CONTACTS_KEY: &str = "@safesearch_contacts";

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// A trusted contact that can receive emergency alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Opaque identifier, generated at creation and never changed.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Phone number as entered by the user.
    pub phone: String,
    /// Optional email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional relationship label (e.g. "sister").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    /// Optional freeform notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When the contact was created.
    pub created_at: DateTime<Utc>,
    /// When the contact fields were last updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Activity history, most recent first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Fields supplied when creating a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    /// Display name.
    pub name: String,
    /// Phone number.
    pub phone: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Optional relationship label.
    pub relationship: Option<String>,
    /// Optional freeform notes.
    pub notes: Option<String>,
}

/// Partial update of a contact. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPatch {
    /// New display name.
    pub name: Option<String>,
    /// New phone number.
    pub phone: Option<String>,
    /// New email address.
    pub email: Option<String>,
    /// New relationship label.
    pub relationship: Option<String>,
    /// New notes.
    pub notes: Option<String>,
}

impl ContactPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.relationship.is_none()
            && self.notes.is_none()
    }
}

/// An immutable record of a past outbound action against one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Whether the message that produced this entry was delivered.
    #[serde(default = "default_delivered")]
    pub delivered: bool,
    /// Payload-specific fields.
    #[serde(flatten)]
    pub kind: HistoryKind,
}

fn default_delivered() -> bool {
    true
}

/// Payload of a [`HistoryEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HistoryKind {
    /// A location alert was sent.
    Location {
        /// WGS84 latitude.
        latitude: f64,
        /// WGS84 longitude.
        longitude: f64,
        /// Fix accuracy in meters.
        accuracy: f64,
        /// Reverse-geocoded address, when one was resolved.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    /// A plain text alert was sent.
    Sms {
        /// Message text.
        message: String,
    },
    /// An audio recording link was sent.
    Recording {
        /// Remote URL of the uploaded recording.
        url: String,
        /// Recording duration in seconds.
        duration: f64,
    },
}

impl HistoryKind {
    /// Short label used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Location { .. } => "location",
            Self::Sms { .. } => "sms",
            Self::Recording { .. } => "recording",
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Digits of an international number: no leading zero, at most 15 digits.
const PHONE_DIGITS_PATTERN: &str = r"^[1-9]\d{1,14}$";

fn phone_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PHONE_DIGITS_PATTERN).ok())
        .as_ref()
}

/// Validate the user-entered fields of a new contact.
///
/// # Errors
///
/// Returns [`ContactError::Invalid`] when the name is blank or the phone
/// number's digits do not form a plausible international number.
pub fn validate_new_contact(fields: &NewContact) -> Result<(), ContactError> {
    if fields.name.trim().is_empty() {
        return Err(ContactError::Invalid("name must not be empty".to_owned()));
    }
    validate_phone_field(&fields.phone)
}

/// Validate a phone number as entered on a contact form.
///
/// # Errors
///
/// Returns [`ContactError::Invalid`] on a blank or malformed number.
pub fn validate_phone_field(phone: &str) -> Result<(), ContactError> {
    if phone.trim().is_empty() {
        return Err(ContactError::Invalid(
            "phone number must not be empty".to_owned(),
        ));
    }
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if !phone_pattern().is_some_and(|re| re.is_match(&digits)) {
        return Err(ContactError::Invalid(format!(
            "invalid phone number: {phone}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from contact store operations.
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    /// No contact exists with the given id.
    #[error("contact not found: {0}")]
    NotFound(String),

    /// Contact fields failed validation.
    #[error("invalid contact: {0}")]
    Invalid(String),

    /// The persisted collection could not be decoded or encoded.
    #[error("contact collection is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The backing key-value store failed.
    #[error("storage error: {0}")]
    Storage(#[from] KvError),

    /// The writer actor is no longer running.
    #[error("contact writer channel closed")]
    WriterClosed,
}
