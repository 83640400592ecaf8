//! Tests for `AlertService` — end-to-end alert flows over fake collaborators.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use safesearch::alert::templates::EmergencyKind;
use safesearch::alert::{AlertDeps, AlertError, AlertService};
use safesearch::audio::RecordingArtifact;
use safesearch::contacts::kv::MemoryKeyValueStore;
use safesearch::contacts::store::ContactStore;
use safesearch::contacts::{Contact, HistoryKind, NewContact};
use safesearch::dispatch::transport::{MessagingTransport, TransportError};
use safesearch::dispatch::DispatchEngine;
use safesearch::location::geocoder::{Address, GeocodeError, ReverseGeocoder};
use safesearch::location::{
    LocationAcquirer, LocationError, LocationOptions, NoPositioning, Positioning,
    StaticPositioning,
};
use safesearch::upload::{BlobUploader, UploadError};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn send(&self, phone_digits: &str, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((phone_digits.to_owned(), text.to_owned()));
        Ok(())
    }
}

struct FixedGeocoder;

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    async fn lookup(&self, _latitude: f64, _longitude: f64) -> Result<Address, GeocodeError> {
        Ok(Address {
            formatted_address: "Market St, San Francisco".to_owned(),
            short_address: "Market St".to_owned(),
        })
    }
}

#[derive(Default)]
struct CountingUploader {
    calls: AtomicU32,
}

#[async_trait]
impl BlobUploader for CountingUploader {
    async fn upload(&self, _local_path: &Path) -> Result<String, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("https://storage.example/audios/audio_1.m4a".to_owned())
    }
}

struct Harness {
    service: AlertService,
    store: Arc<ContactStore>,
    transport: Arc<RecordingTransport>,
    uploader: Arc<CountingUploader>,
}

fn harness(positioning: Arc<dyn Positioning>) -> Harness {
    let store = Arc::new(ContactStore::new(
        Arc::new(MemoryKeyValueStore::new()),
        "@alert_test",
    ));
    let transport = Arc::new(RecordingTransport::default());
    let uploader = Arc::new(CountingUploader::default());
    let service = AlertService::new(AlertDeps {
        contacts: Arc::clone(&store),
        engine: DispatchEngine::new(
            Arc::clone(&transport) as Arc<dyn MessagingTransport>,
            Arc::clone(&store),
            500,
        ),
        acquirer: LocationAcquirer::new(positioning),
        geocoder: Some(Arc::new(FixedGeocoder)),
        uploader: Some(Arc::clone(&uploader) as Arc<dyn BlobUploader>),
        location_options: LocationOptions {
            max_retries: 2,
            retry_delay_ms: 100,
            ..LocationOptions::default()
        },
        confirmation_expiry_secs: 300,
    });
    Harness {
        service,
        store,
        transport,
        uploader,
    }
}

async fn add(store: &ContactStore, name: &str, phone: &str) -> Contact {
    store
        .create(NewContact {
            name: name.to_owned(),
            phone: phone.to_owned(),
            ..NewContact::default()
        })
        .await
        .expect("create should succeed")
}

fn ids(contacts: &[&Contact]) -> Vec<String> {
    contacts.iter().map(|c| c.id.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn location_alert_prepare_then_confirm() {
    let h = harness(Arc::new(StaticPositioning::new(37.7749, -122.4194, 8.0)));
    let a = add(&h.store, "A", "5550000001").await;
    let b = add(&h.store, "B", "5550000002").await;

    let prepared = h
        .service
        .prepare_location_alert(&ids(&[&a, &b]), None)
        .await
        .expect("prepare should succeed");

    assert!(prepared.prompt.ends_with("Send to 2 contact(s)?"));
    assert!(prepared.message.contains("📍 ADDRESS:\nMarket St, San Francisco"));
    assert!(h.transport.sent().is_empty());

    let report = h
        .service
        .confirm(&prepared.id, None, None)
        .await
        .expect("confirm should succeed");

    assert_eq!(report.successful, 2);
    assert!(report.all_succeeded());
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, text)| *text == prepared.message));

    let a = h.store.get(&a.id).await.expect("get").expect("exists");
    match &a.history[0].kind {
        HistoryKind::Location { address, .. } => {
            assert_eq!(address.as_deref(), Some("Market St, San Francisco"));
        }
        other => panic!("expected location history, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn declined_alert_sends_nothing() {
    let h = harness(Arc::new(StaticPositioning::new(1.0, 2.0, 5.0)));
    let a = add(&h.store, "A", "5550000001").await;

    let prepared = h
        .service
        .prepare_location_alert(&ids(&[&a]), None)
        .await
        .expect("prepare should succeed");
    assert!(h.service.decline(&prepared.id));

    let result = h.service.confirm(&prepared.id, None, None).await;
    assert!(matches!(result, Err(AlertError::ConfirmationNotFound(_))));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_valid_targets_is_rejected_before_location() {
    let h = harness(Arc::new(NoPositioning));

    let result = h
        .service
        .prepare_location_alert(&["missing".to_owned()], None)
        .await;

    assert!(matches!(result, Err(AlertError::NoValidTargets)));
}

#[tokio::test(start_paused = true)]
async fn location_failure_surfaces_after_retries() {
    let h = harness(Arc::new(NoPositioning));
    let a = add(&h.store, "A", "5550000001").await;

    let result = h.service.prepare_location_alert(&ids(&[&a]), None).await;

    assert!(matches!(
        result,
        Err(AlertError::Location(LocationError::Unavailable(_)))
    ));
    assert!(h.service.confirmations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn targets_resolve_in_store_order() {
    let h = harness(Arc::new(NoPositioning));
    let a = add(&h.store, "A", "5550000001").await;
    let b = add(&h.store, "B", "5550000002").await;

    let targets = h
        .service
        .resolve_targets(&ids(&[&b, &a]))
        .await
        .expect("resolve should succeed");

    let names: Vec<&str> = targets.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["A", "B"]);
}

#[tokio::test(start_paused = true)]
async fn emergency_alert_sends_canned_text() {
    let h = harness(Arc::new(NoPositioning));
    let a = add(&h.store, "A", "5550000001").await;

    let report = h
        .service
        .send_emergency_alert(&ids(&[&a]), EmergencyKind::Police, None, None, None)
        .await
        .expect("send should succeed");

    assert_eq!(report.successful, 1);
    let sent = h.transport.sent();
    assert!(sent[0].1.starts_with("🚨 POLICE ASSISTANCE NEEDED 🚨"));
}

#[tokio::test(start_paused = true)]
async fn audio_alert_uploads_once_and_records_history() {
    let h = harness(Arc::new(NoPositioning));
    let a = add(&h.store, "A", "5550000001").await;
    let mut artifact = RecordingArtifact::new(PathBuf::from("/tmp/recording_1.m4a"), 9.0);

    h.service
        .send_audio_alert(&ids(&[&a]), &mut artifact, None, None)
        .await
        .expect("first send should succeed");
    h.service
        .send_audio_alert(&ids(&[&a]), &mut artifact, None, None)
        .await
        .expect("second send should succeed");

    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        artifact.remote_url.as_deref(),
        Some("https://storage.example/audios/audio_1.m4a")
    );

    let sent = h.transport.sent();
    assert!(sent[0]
        .1
        .contains("Listen here: https://storage.example/audios/audio_1.m4a"));

    let a = h.store.get(&a.id).await.expect("get").expect("exists");
    assert_eq!(a.history.len(), 2);
    assert!(matches!(
        &a.history[0].kind,
        HistoryKind::Recording { duration, .. } if (*duration - 9.0).abs() < f64::EPSILON
    ));
}

#[tokio::test(start_paused = true)]
async fn audio_alert_without_valid_targets_skips_upload() {
    let h = harness(Arc::new(NoPositioning));
    let mut artifact = RecordingArtifact::new(PathBuf::from("/tmp/recording_1.m4a"), 9.0);

    let result = h
        .service
        .send_audio_alert(&["missing".to_owned()], &mut artifact, None, None)
        .await;

    assert!(matches!(result, Err(AlertError::NoValidTargets)));
    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 0);
}
