//! Audio capture session: one recording at a time.
//!
//! State machine: `Idle --start--> Recording --stop--> Idle`. The stop
//! transition yields a [`RecordingArtifact`]. Encoding is delegated to an
//! [`AudioHardware`] implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Audio encoder requested from the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoder {
    /// AAC in an MPEG-4 container.
    Aac,
}

/// Capture source requested from the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    /// Device microphone.
    Mic,
}

/// Parameters for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Output file.
    pub path: PathBuf,
    /// Encoder.
    pub encoder: AudioEncoder,
    /// Capture source.
    pub source: AudioSource,
    /// Channel count.
    pub channels: u8,
    /// Encoder quality hint (0-127).
    pub quality: u8,
}

impl CaptureConfig {
    /// Default emergency-message settings writing to `path`.
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            encoder: AudioEncoder::Aac,
            source: AudioSource::Mic,
            channels: 2,
            quality: 50,
        }
    }
}

/// What the hardware reports when a capture stops.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    /// File the audio was written to.
    pub file_path: PathBuf,
    /// Recorded duration in seconds.
    pub duration_seconds: f64,
}

/// Device audio capture capability.
#[async_trait]
pub trait AudioHardware: Send + Sync {
    /// Begin capturing with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Hardware`] if capture cannot start.
    async fn start_capture(&self, config: &CaptureConfig) -> Result<(), AudioError>;

    /// Stop the active capture.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Hardware`] if the capture cannot be finalized.
    async fn stop_capture(&self) -> Result<CaptureResult, AudioError>;
}

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingArtifact {
    /// Local file holding the audio.
    pub local_path: PathBuf,
    /// Duration in seconds.
    pub duration_seconds: f64,
    /// Remote URL once uploaded.
    pub remote_url: Option<String>,
}

impl RecordingArtifact {
    /// Artifact for an existing local file.
    pub fn new(local_path: PathBuf, duration_seconds: f64) -> Self {
        Self {
            local_path,
            duration_seconds,
            remote_url: None,
        }
    }

    /// Record the upload URL. Allowed exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::AlreadyUploaded`] if a URL is already set.
    pub fn set_remote_url(&mut self, url: String) -> Result<(), AudioError> {
        if self.remote_url.is_some() {
            return Err(AudioError::AlreadyUploaded);
        }
        self.remote_url = Some(url);
        Ok(())
    }
}

/// Errors from the capture session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AudioError {
    /// `start` was called while a recording is active.
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// `stop` or `cancel` was called with no active recording.
    #[error("no active recording to stop")]
    NotRecording,

    /// The artifact already has a remote URL.
    #[error("recording already uploaded")]
    AlreadyUploaded,

    /// The audio hardware reported a failure.
    #[error("audio hardware error: {0}")]
    Hardware(String),
}

#[derive(Debug)]
enum CaptureState {
    Idle,
    Recording { path: PathBuf },
}

/// Start/stop lifecycle for a single recording.
pub struct AudioCaptureSession {
    hardware: Box<dyn AudioHardware>,
    recordings_dir: PathBuf,
    state: Mutex<CaptureState>,
}

impl std::fmt::Debug for AudioCaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCaptureSession")
            .field("recordings_dir", &self.recordings_dir)
            .finish_non_exhaustive()
    }
}

impl AudioCaptureSession {
    /// Create an idle session writing recordings under `recordings_dir`.
    pub fn new(hardware: Box<dyn AudioHardware>, recordings_dir: &Path) -> Self {
        Self {
            hardware,
            recordings_dir: recordings_dir.to_path_buf(),
            state: Mutex::new(CaptureState::Idle),
        }
    }

    /// Whether a recording is active.
    pub async fn is_recording(&self) -> bool {
        matches!(*self.state.lock().await, CaptureState::Recording { .. })
    }

    /// Start recording. Returns the file being written.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::AlreadyRecording`] if a recording is active,
    /// or [`AudioError::Hardware`] if capture fails to start (the session
    /// stays idle).
    pub async fn start(&self) -> Result<PathBuf, AudioError> {
        let mut state = self.state.lock().await;
        if matches!(*state, CaptureState::Recording { .. }) {
            return Err(AudioError::AlreadyRecording);
        }

        let path = self
            .recordings_dir
            .join(format!("recording_{}.m4a", Utc::now().timestamp_millis()));
        self.hardware
            .start_capture(&CaptureConfig::for_path(path.clone()))
            .await?;

        info!(path = %path.display(), "recording started");
        *state = CaptureState::Recording { path: path.clone() };
        Ok(path)
    }

    /// Stop recording and return the artifact.
    ///
    /// The session returns to idle even if the hardware fails to finalize.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::NotRecording`] when idle, or
    /// [`AudioError::Hardware`] if the capture could not be finalized.
    pub async fn stop(&self) -> Result<RecordingArtifact, AudioError> {
        let mut state = self.state.lock().await;
        let CaptureState::Recording { path } = std::mem::replace(&mut *state, CaptureState::Idle)
        else {
            return Err(AudioError::NotRecording);
        };

        let result = self.hardware.stop_capture().await.inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to finalize recording");
        })?;

        info!(
            path = %result.file_path.display(),
            duration_s = result.duration_seconds,
            "recording stopped"
        );
        Ok(RecordingArtifact::new(
            result.file_path,
            result.duration_seconds,
        ))
    }

    /// Stop recording and discard the result.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::NotRecording`] when idle.
    pub async fn cancel(&self) -> Result<(), AudioError> {
        let artifact = self.stop().await?;
        info!(path = %artifact.local_path.display(), "recording cancelled");
        if let Err(e) = tokio::fs::remove_file(&artifact.local_path).await {
            warn!(error = %e, "failed to remove cancelled recording");
        }
        Ok(())
    }
}
