//! Tests for `LocationAcquirer` — retry, timeout and cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use safesearch::cancel::cancel_pair;
use safesearch::location::{
    LocationAcquirer, LocationError, LocationFix, LocationOptions, NoPositioning, Positioning,
    PositionRequest, StaticPositioning,
};

fn fix(latitude: f64, longitude: f64) -> LocationFix {
    LocationFix {
        latitude,
        longitude,
        accuracy: 5.0,
        altitude: None,
        altitude_accuracy: None,
        heading: None,
        speed: None,
        timestamp: 1_700_000_000_000,
    }
}

/// Replays a fixed sequence of results, then repeats the last one.
struct ScriptedPositioning {
    script: Mutex<VecDeque<Result<LocationFix, LocationError>>>,
    calls: AtomicU32,
}

impl ScriptedPositioning {
    fn new(script: Vec<Result<LocationFix, LocationError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Positioning for ScriptedPositioning {
    async fn current_position(
        &self,
        _request: &PositionRequest,
    ) -> Result<LocationFix, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().expect("script lock");
        if script.len() > 1 {
            script.pop_front().expect("script is non-empty")
        } else {
            script
                .front()
                .cloned()
                .unwrap_or(Err(LocationError::Unavailable("empty script".to_owned())))
        }
    }
}

/// Never answers.
struct HangingPositioning;

#[async_trait]
impl Positioning for HangingPositioning {
    async fn current_position(
        &self,
        _request: &PositionRequest,
    ) -> Result<LocationFix, LocationError> {
        std::future::pending().await
    }
}

fn options(max_retries: u32, retry_delay_ms: u64) -> LocationOptions {
    LocationOptions {
        max_retries,
        retry_delay_ms,
        timeout_ms: 1_000,
        ..LocationOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn succeeds_after_two_failures_with_two_delays() {
    let positioning = ScriptedPositioning::new(vec![
        Err(LocationError::Unavailable("no signal".to_owned())),
        Err(LocationError::Timeout),
        Ok(fix(51.5, -0.12)),
    ]);
    let acquirer = LocationAcquirer::new(positioning.clone());

    let start = Instant::now();
    let result = acquirer.acquire(&options(3, 2_000), None).await;

    assert_eq!(result, Ok(fix(51.5, -0.12)));
    assert_eq!(positioning.calls(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(4_000));
    assert_eq!(acquirer.last_fix(), Some(fix(51.5, -0.12)));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_returns_last_error_without_trailing_delay() {
    let positioning = ScriptedPositioning::new(vec![
        Err(LocationError::Timeout),
        Err(LocationError::Unavailable("gps off".to_owned())),
    ]);
    let acquirer = LocationAcquirer::new(positioning.clone());

    let start = Instant::now();
    let result = acquirer.acquire(&options(2, 500), None).await;

    assert_eq!(result, Err(LocationError::Unavailable("gps off".to_owned())));
    assert_eq!(positioning.calls(), 2);
    assert_eq!(start.elapsed(), Duration::from_millis(500));
    assert!(acquirer.last_fix().is_none());
}

#[tokio::test(start_paused = true)]
async fn permission_denied_is_not_retried() {
    let positioning = ScriptedPositioning::new(vec![Err(LocationError::PermissionDenied)]);
    let acquirer = LocationAcquirer::new(positioning.clone());

    let result = acquirer.acquire(&options(3, 2_000), None).await;

    assert_eq!(result, Err(LocationError::PermissionDenied));
    assert_eq!(positioning.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_retries_still_makes_one_attempt() {
    let positioning = ScriptedPositioning::new(vec![Err(LocationError::Timeout)]);
    let acquirer = LocationAcquirer::new(positioning.clone());

    let result = acquirer.acquire(&options(0, 2_000), None).await;

    assert_eq!(result, Err(LocationError::Timeout));
    assert_eq!(positioning.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_source_times_out_locally() {
    let acquirer = LocationAcquirer::new(Arc::new(HangingPositioning));

    let result = acquirer.acquire(&options(1, 0), None).await;

    assert_eq!(result, Err(LocationError::Timeout));
}

#[tokio::test(start_paused = true)]
async fn out_of_range_fix_is_rejected_and_retried() {
    let positioning = ScriptedPositioning::new(vec![Ok(fix(123.0, 0.0)), Ok(fix(10.0, 20.0))]);
    let acquirer = LocationAcquirer::new(positioning.clone());

    let result = acquirer.acquire(&options(2, 100), None).await;

    assert_eq!(result, Ok(fix(10.0, 20.0)));
    assert_eq!(positioning.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_makes_no_attempt() {
    let positioning = ScriptedPositioning::new(vec![Ok(fix(1.0, 2.0))]);
    let acquirer = LocationAcquirer::new(positioning.clone());
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let result = acquirer.acquire(&options(3, 100), Some(&signal)).await;

    assert_eq!(result, Err(LocationError::Cancelled));
    assert_eq!(positioning.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_retry_delay_stops_next_attempt() {
    let positioning = ScriptedPositioning::new(vec![Err(LocationError::Timeout)]);
    let acquirer = Arc::new(LocationAcquirer::new(positioning.clone()));
    let (handle, signal) = cancel_pair();

    let task = {
        let acquirer = Arc::clone(&acquirer);
        tokio::spawn(async move { acquirer.acquire(&options(5, 1_000), Some(&signal)).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.cancel();

    let result = task.await.expect("task should not panic");
    assert_eq!(result, Err(LocationError::Cancelled));
    assert_eq!(positioning.calls(), 1);
}

#[tokio::test]
async fn static_positioning_reports_configured_point() {
    let acquirer = LocationAcquirer::new(Arc::new(StaticPositioning::new(48.85, 2.35, 12.0)));
    let fix = acquirer
        .acquire(&LocationOptions::default(), None)
        .await
        .expect("static fix should succeed");
    assert!((fix.latitude - 48.85).abs() < f64::EPSILON);
    assert!((fix.accuracy - 12.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn no_positioning_is_unavailable() {
    let acquirer = LocationAcquirer::new(Arc::new(NoPositioning));
    let result = acquirer.acquire(&options(2, 10), None).await;
    assert!(matches!(result, Err(LocationError::Unavailable(_))));
}

#[test]
fn user_messages_match_error_kind() {
    assert_eq!(
        LocationError::PermissionDenied.user_message(),
        "Please enable location permissions in settings"
    );
    assert_eq!(
        LocationError::Timeout.user_message(),
        "Taking too long to get location. Try moving to open area"
    );
    assert!(LocationError::Timeout.is_transient());
    assert!(!LocationError::PermissionDenied.is_transient());
}
