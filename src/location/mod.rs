//! Location acquisition with timeout and bounded sequential retry.
//!
//! [`LocationAcquirer`] wraps a [`Positioning`] source. Attempts never run
//! concurrently: the GPS receiver is one shared piece of hardware.

pub mod geocoder;
pub mod message;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::{self, CancelSignal};

/// Extra time granted past the platform timeout before the attempt is
/// abandoned locally.
const LOCAL_TIMEOUT_GRACE_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single acquired position reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Altitude in meters, if reported.
    pub altitude: Option<f64>,
    /// Altitude accuracy in meters, if reported.
    pub altitude_accuracy: Option<f64>,
    /// Heading in degrees, if reported.
    pub heading: Option<f64>,
    /// Speed in m/s, if reported.
    pub speed: Option<f64>,
    /// Fix time, epoch milliseconds.
    pub timestamp: i64,
}

impl LocationFix {
    /// Check that the coordinates and accuracy are physically meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Unavailable`] describing the bad field.
    pub fn validate(&self) -> Result<(), LocationError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(LocationError::Unavailable(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(LocationError::Unavailable(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(LocationError::Unavailable(format!(
                "invalid accuracy: {}",
                self.accuracy
            )));
        }
        Ok(())
    }
}

/// Options for [`LocationAcquirer::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationOptions {
    /// Request a GPS-grade fix rather than a coarse network fix.
    pub enable_high_accuracy: bool,
    /// Upper bound on each individual position request.
    pub timeout_ms: u64,
    /// Oldest cached fix the platform may return.
    pub maximum_age_ms: u64,
    /// Total attempts (values below 1 are treated as 1).
    pub max_retries: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_delay_ms: u64,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 30_000,
            maximum_age_ms: 10_000,
            max_retries: 3,
            retry_delay_ms: 2_000,
        }
    }
}

/// A single request issued to the positioning source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRequest {
    /// Request a GPS-grade fix.
    pub high_accuracy: bool,
    /// Platform-side timeout.
    pub timeout_ms: u64,
    /// Oldest acceptable cached fix.
    pub maximum_age_ms: u64,
}

/// Errors from location acquisition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    /// The user or OS declined location access.
    #[error("location permission denied")]
    PermissionDenied,

    /// No fix could be produced (GPS off, no signal, bad reading).
    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("location request timed out")]
    Timeout,

    /// The caller cancelled before the next attempt started.
    #[error("location request cancelled")]
    Cancelled,
}

impl LocationError {
    /// Remediation hint suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Please enable location permissions in settings",
            Self::Unavailable(_) => "Check if GPS is enabled and you have clear sky view",
            Self::Timeout => "Taking too long to get location. Try moving to open area",
            Self::Cancelled => "Location request was cancelled",
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

// ---------------------------------------------------------------------------
// Positioning sources
// ---------------------------------------------------------------------------

/// Device positioning capability.
#[async_trait]
pub trait Positioning: Send + Sync {
    /// Produce one position reading.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] when no fix can be produced.
    async fn current_position(&self, request: &PositionRequest)
        -> Result<LocationFix, LocationError>;
}

/// Positioning source that always reports one configured coordinate.
#[derive(Debug, Clone)]
pub struct StaticPositioning {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
}

impl StaticPositioning {
    /// Create a source fixed at the given coordinate.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
        }
    }
}

#[async_trait]
impl Positioning for StaticPositioning {
    async fn current_position(
        &self,
        _request: &PositionRequest,
    ) -> Result<LocationFix, LocationError> {
        Ok(LocationFix {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
            timestamp: Utc::now().timestamp_millis(),
        })
    }
}

/// Positioning source used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPositioning;

#[async_trait]
impl Positioning for NoPositioning {
    async fn current_position(
        &self,
        _request: &PositionRequest,
    ) -> Result<LocationFix, LocationError> {
        Err(LocationError::Unavailable(
            "no positioning source configured".to_owned(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Acquirer
// ---------------------------------------------------------------------------

/// Acquires a fix with per-attempt timeout and bounded retry.
pub struct LocationAcquirer {
    positioning: Arc<dyn Positioning>,
    last_fix: Mutex<Option<LocationFix>>,
}

impl std::fmt::Debug for LocationAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationAcquirer").finish_non_exhaustive()
    }
}

impl LocationAcquirer {
    /// Create an acquirer over the given positioning source.
    pub fn new(positioning: Arc<dyn Positioning>) -> Self {
        Self {
            positioning,
            last_fix: Mutex::new(None),
        }
    }

    /// Acquire a fix, retrying transient failures.
    ///
    /// Attempts run strictly one after another. After a failed attempt the
    /// acquirer sleeps `retry_delay_ms` unless it was the final attempt, in
    /// which case that attempt's error is returned as-is. Permission denial
    /// is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last [`LocationError`] once attempts are exhausted, or
    /// [`LocationError::Cancelled`] if `cancel` fires between attempts.
    pub async fn acquire(
        &self,
        options: &LocationOptions,
        cancel: Option<&CancelSignal>,
    ) -> Result<LocationFix, LocationError> {
        let attempts = options.max_retries.max(1);
        let request = PositionRequest {
            high_accuracy: options.enable_high_accuracy,
            timeout_ms: options.timeout_ms,
            maximum_age_ms: options.maximum_age_ms,
        };
        let local_timeout =
            Duration::from_millis(options.timeout_ms.saturating_add(LOCAL_TIMEOUT_GRACE_MS));
        let retry_delay = Duration::from_millis(options.retry_delay_ms);

        let mut attempt: u32 = 1;
        loop {
            if cancel::is_cancelled(cancel) {
                info!(attempt, "location acquisition cancelled");
                return Err(LocationError::Cancelled);
            }

            debug!(attempt, attempts, "location attempt");
            let result = match tokio::time::timeout(
                local_timeout,
                self.positioning.current_position(&request),
            )
            .await
            {
                Ok(inner) => inner.and_then(|fix| fix.validate().map(|()| fix)),
                Err(_) => Err(LocationError::Timeout),
            };

            match result {
                Ok(fix) => {
                    info!(
                        attempt,
                        accuracy_m = fix.accuracy,
                        "location acquired"
                    );
                    if let Ok(mut last) = self.last_fix.lock() {
                        *last = Some(fix.clone());
                    }
                    return Ok(fix);
                }
                Err(LocationError::PermissionDenied) => {
                    warn!(attempt, "location permission denied, not retrying");
                    return Err(LocationError::PermissionDenied);
                }
                Err(e) if attempt >= attempts => {
                    warn!(attempt, error = %e, "location attempts exhausted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "location attempt failed, retrying");
                    tokio::time::sleep(retry_delay).await;
                }
            }
            attempt = attempt.saturating_add(1);
        }
    }

    /// The most recent successfully acquired fix, if any.
    pub fn last_fix(&self) -> Option<LocationFix> {
        self.last_fix.lock().ok().and_then(|last| last.clone())
    }
}
