//! Alert orchestration: the user-level actions built on the core pieces.
//!
//! [`AlertService`] resolves selected contacts, produces the payload
//! (location fix, uploaded recording, or canned text) and hands it to the
//! [`DispatchEngine`]. Location alerts are two-step: prepare (acquire the
//! fix and park the rendered alert) then confirm or decline.

pub mod confirmation;
pub mod templates;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::audio::RecordingArtifact;
use crate::cancel::CancelSignal;
use crate::contacts::store::ContactStore;
use crate::contacts::{Contact, ContactError, HistoryKind};
use crate::dispatch::phone::normalize_phone;
use crate::dispatch::report::BatchReport;
use crate::dispatch::{AlertMessage, DispatchEngine, DispatchError, ProgressFn};
use crate::location::geocoder::{lookup_best_effort, ReverseGeocoder};
use crate::location::message::render_message;
use crate::location::{LocationAcquirer, LocationError, LocationFix, LocationOptions};
use crate::upload::{upload_recording, BlobUploader, UploadError};

use self::confirmation::{ConfirmationQueue, Resolution};
use self::templates::EmergencyKind;

/// Errors that abort a user-initiated alert.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// No selected contact has a sendable phone number.
    #[error("no valid targets: select at least one contact with a valid phone number")]
    NoValidTargets,

    /// Location could not be acquired.
    #[error("location error: {0}")]
    Location(#[from] LocationError),

    /// Contact store failure.
    #[error("contact store error: {0}")]
    Contacts(#[from] ContactError),

    /// The batch as a whole was rejected or cancelled.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Recording upload failed.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// The recording has no URL and no uploader is configured.
    #[error("no uploader configured for recordings")]
    UploaderNotConfigured,

    /// The pending alert expired before confirmation.
    #[error("pending alert expired")]
    ConfirmationExpired,

    /// No pending alert with that id.
    #[error("no pending alert with id {0}")]
    ConfirmationNotFound(String),
}

/// A location alert ready for the user to confirm.
#[derive(Debug, Clone)]
pub struct PreparedAlert {
    /// Confirmation id to pass to [`AlertService::confirm`].
    pub id: String,
    /// Prompt to show the user.
    pub prompt: String,
    /// Rendered message body.
    pub message: String,
    /// The acquired fix.
    pub fix: LocationFix,
}

/// Collaborators for [`AlertService`].
pub struct AlertDeps {
    /// Contact store.
    pub contacts: Arc<ContactStore>,
    /// Dispatch engine.
    pub engine: DispatchEngine,
    /// Location acquirer.
    pub acquirer: LocationAcquirer,
    /// Optional reverse geocoder.
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
    /// Optional recording uploader.
    pub uploader: Option<Arc<dyn BlobUploader>>,
    /// Options used for location alerts.
    pub location_options: LocationOptions,
    /// Lifetime of a prepared alert, in seconds.
    pub confirmation_expiry_secs: i64,
}

/// User-level alert actions.
pub struct AlertService {
    contacts: Arc<ContactStore>,
    engine: DispatchEngine,
    acquirer: LocationAcquirer,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    uploader: Option<Arc<dyn BlobUploader>>,
    location_options: LocationOptions,
    confirmations: ConfirmationQueue,
}

impl std::fmt::Debug for AlertService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertService")
            .field("geocoder", &self.geocoder.is_some())
            .field("uploader", &self.uploader.is_some())
            .finish_non_exhaustive()
    }
}

impl AlertService {
    /// Assemble the service from its collaborators.
    pub fn new(deps: AlertDeps) -> Self {
        Self {
            contacts: deps.contacts,
            engine: deps.engine,
            acquirer: deps.acquirer,
            geocoder: deps.geocoder,
            uploader: deps.uploader,
            location_options: deps.location_options,
            confirmations: ConfirmationQueue::new(deps.confirmation_expiry_secs),
        }
    }

    /// Pending confirmations.
    pub fn confirmations(&self) -> &ConfirmationQueue {
        &self.confirmations
    }

    /// Load the selected contacts, in store order.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NoValidTargets`] if none of the selected
    /// contacts has a sendable phone number.
    pub async fn resolve_targets(&self, contact_ids: &[String]) -> Result<Vec<Contact>, AlertError> {
        let targets: Vec<Contact> = self
            .contacts
            .list()
            .await?
            .into_iter()
            .filter(|c| contact_ids.contains(&c.id))
            .collect();

        if !targets.iter().any(|c| normalize_phone(&c.phone).is_some()) {
            warn!(selected = contact_ids.len(), "no valid targets for alert");
            return Err(AlertError::NoValidTargets);
        }
        Ok(targets)
    }

    /// Acquire a fix and park a location alert for confirmation.
    ///
    /// Reverse geocoding is best-effort; without an address the message
    /// simply omits the address block.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NoValidTargets`] before touching the GPS, or
    /// [`AlertError::Location`] once location retries are exhausted.
    pub async fn prepare_location_alert(
        &self,
        contact_ids: &[String],
        cancel: Option<&CancelSignal>,
    ) -> Result<PreparedAlert, AlertError> {
        let dropped = self.confirmations.gc_expired(Utc::now());
        if dropped > 0 {
            debug!(dropped, "dropped expired confirmations");
        }

        let targets = self.resolve_targets(contact_ids).await?;
        let fix = self.acquirer.acquire(&self.location_options, cancel).await?;
        let address =
            lookup_best_effort(self.geocoder.as_deref(), fix.latitude, fix.longitude).await;

        let text = render_message(&fix, address.as_ref());
        let message = AlertMessage {
            text: text.clone(),
            history: Some(HistoryKind::Location {
                latitude: fix.latitude,
                longitude: fix.longitude,
                accuracy: fix.accuracy,
                address: address.map(|a| a.formatted_address),
            }),
        };
        let prompt = templates::location_prompt(&fix, targets.len());
        let ids = targets.into_iter().map(|c| c.id).collect();
        let pending = self.confirmations.park(ids, message, prompt);

        info!(id = %pending.id, "location alert awaiting confirmation");
        Ok(PreparedAlert {
            id: pending.id,
            prompt: pending.prompt,
            message: text,
            fix,
        })
    }

    /// Dispatch a prepared alert.
    ///
    /// Contacts are re-resolved, so contacts deleted in the meantime are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::ConfirmationNotFound`] or
    /// [`AlertError::ConfirmationExpired`] for a stale id, and any
    /// dispatch-level error.
    pub async fn confirm(
        &self,
        id: &str,
        on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancelSignal>,
    ) -> Result<BatchReport, AlertError> {
        let pending = match self.confirmations.take(id) {
            Resolution::Ready(pending) => pending,
            Resolution::Expired => return Err(AlertError::ConfirmationExpired),
            Resolution::NotFound => return Err(AlertError::ConfirmationNotFound(id.to_owned())),
        };
        let targets = self.resolve_targets(&pending.contact_ids).await?;
        self.run_batch(&targets, &pending.message, on_progress, cancel)
            .await
    }

    /// Drop a prepared alert without sending. Returns whether it existed.
    pub fn decline(&self, id: &str) -> bool {
        let existed = self.confirmations.discard(id);
        info!(id, existed, "location alert declined");
        existed
    }

    /// Send a canned emergency alert.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NoValidTargets`] or a dispatch-level error.
    pub async fn send_emergency_alert(
        &self,
        contact_ids: &[String],
        kind: EmergencyKind,
        custom: Option<&str>,
        on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancelSignal>,
    ) -> Result<BatchReport, AlertError> {
        let targets = self.resolve_targets(contact_ids).await?;
        let message = AlertMessage::sms(templates::emergency_message(kind, custom, Utc::now()));
        info!(kind = kind.as_str(), "sending emergency alert");
        self.run_batch(&targets, &message, on_progress, cancel).await
    }

    /// Upload a recording (if needed) and send its link.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::NoValidTargets`] before uploading,
    /// [`AlertError::UploaderNotConfigured`] or [`AlertError::Upload`] if the
    /// recording cannot be published, or a dispatch-level error.
    pub async fn send_audio_alert(
        &self,
        contact_ids: &[String],
        artifact: &mut RecordingArtifact,
        on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancelSignal>,
    ) -> Result<BatchReport, AlertError> {
        let targets = self.resolve_targets(contact_ids).await?;

        let url = if let Some(url) = artifact.remote_url.clone() {
            url
        } else {
            let uploader = self
                .uploader
                .as_ref()
                .ok_or(AlertError::UploaderNotConfigured)?;
            upload_recording(uploader.as_ref(), artifact).await?
        };

        let message = AlertMessage {
            text: templates::audio_message(&url, artifact.duration_seconds, Utc::now()),
            history: Some(HistoryKind::Recording {
                url,
                duration: artifact.duration_seconds,
            }),
        };
        self.run_batch(&targets, &message, on_progress, cancel).await
    }

    async fn run_batch(
        &self,
        targets: &[Contact],
        message: &AlertMessage,
        on_progress: Option<ProgressFn<'_>>,
        cancel: Option<&CancelSignal>,
    ) -> Result<BatchReport, AlertError> {
        let outcomes = self
            .engine
            .dispatch(targets, message, on_progress, cancel)
            .await?;
        let report = BatchReport::from_outcomes(outcomes);
        if report.all_succeeded() {
            info!(successful = report.successful, "alert delivered");
        } else {
            warn!(
                successful = report.successful,
                failed = report.failed,
                "alert partially delivered"
            );
        }
        Ok(report)
    }
}
