//! Integration tests for the event-processing pipeline
//!
//! Drives a full pipeline over the in-process bus with stubbed sample-store
//! and audit collaborators, covering the new/promoted request stages, the
//! sample-update stage, the request-reply responder, and drain-on-shutdown.

use async_trait::async_trait;
use cmolabel_common::config::ServiceConfig;
use cmolabel_common::messaging::MessageBus;
use cmolabel_common::{Result, SampleDescriptor};
use cmolabel_gen::audit::{AuditLog, StatusKind};
use cmolabel_gen::pipeline::PipelineContext;
use cmolabel_gen::store::SampleStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Sample store stub serving canned context lists
#[derive(Default)]
struct StubStore {
    by_patient: HashMap<String, Vec<SampleDescriptor>>,
    by_alt_id: HashMap<String, Vec<SampleDescriptor>>,
}

#[async_trait]
impl SampleStore for StubStore {
    async fn fetch_existing_samples(&self, patient_id: &str) -> Result<Vec<SampleDescriptor>> {
        Ok(self.by_patient.get(patient_id).cloned().unwrap_or_default())
    }

    async fn fetch_samples_by_alt_id(&self, alt_id: &str) -> Result<Vec<SampleDescriptor>> {
        Ok(self.by_alt_id.get(alt_id).cloned().unwrap_or_default())
    }
}

/// Audit log stub recording every entry in memory
#[derive(Default)]
struct RecordingAudit {
    entries: Mutex<Vec<(String, StatusKind)>>,
}

impl RecordingAudit {
    async fn kinds(&self) -> Vec<StatusKind> {
        self.entries.lock().await.iter().map(|(_, k)| *k).collect()
    }

    async fn wait_for(&self, kind: StatusKind) {
        for _ in 0..100 {
            if self.kinds().await.contains(&kind) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("audit entry {:?} never recorded", kind);
    }
}

#[async_trait]
impl AuditLog for RecordingAudit {
    async fn log_status(&self, raw_message: &str, kind: StatusKind) {
        self.entries
            .lock()
            .await
            .push((raw_message.to_string(), kind));
    }
}

fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.poll_interval_ms = 20;
    config.queue_capacity = 16;
    config
}

fn xenograft_record(primary_id: &str, patient_id: &str) -> Value {
    json!({
        "igoId": primary_id,
        "cmoPatientId": patient_id,
        "specimenType": "Xenograft",
        "naToExtract": "DNA",
        "requestId": "22022_BZ",
        "isCmoSample": true
    })
}

async fn start_pipeline(
    store: StubStore,
) -> (MessageBus, Arc<RecordingAudit>, PipelineContext, ServiceConfig) {
    let config = test_config();
    let bus = MessageBus::new(64);
    let audit = Arc::new(RecordingAudit::default());
    let pipeline = PipelineContext::start(
        &config,
        bus.clone(),
        Arc::new(store),
        Arc::clone(&audit) as Arc<dyn AuditLog>,
    )
    .await
    .unwrap();
    (bus, audit, pipeline, config)
}

#[tokio::test]
async fn new_request_is_enriched_and_republished() {
    let (bus, _audit, pipeline, config) = start_pipeline(StubStore::default()).await;
    let mut out_rx = bus.subscribe(&config.topics.new_request_out);

    let request = json!({
        "requestId": "22022_BZ",
        "projectManagerName": "PM",
        "samples": [
            xenograft_record("22022_BZ_1", "C-1235"),
            { "igoId": "22022_BZ_2", "cmoPatientId": "C-1235", "isCmoSample": false }
        ]
    });
    bus.publish(&config.topics.new_request_in, request.to_string())
        .unwrap();

    let outbound = timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("no outbound request")
        .unwrap();
    let enriched: Value = serde_json::from_str(&outbound.payload).unwrap();

    // Non-CMO sample filtered, CMO sample labeled, envelope preserved
    assert_eq!(enriched["requestId"], "22022_BZ");
    assert_eq!(enriched["projectManagerName"], "PM");
    let samples = enriched["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0]["cmoSampleName"], "C-1235-X001-d01");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn promoted_request_routes_to_its_own_topic() {
    let (bus, _audit, pipeline, config) = start_pipeline(StubStore::default()).await;
    let mut promoted_rx = bus.subscribe(&config.topics.promoted_request_out);
    let mut new_rx = bus.subscribe(&config.topics.new_request_out);

    let request = json!({
        "requestId": "30044_P",
        "samples": [xenograft_record("30044_P_1", "C-4567")]
    });
    bus.publish(&config.topics.promoted_request_in, request.to_string())
        .unwrap();

    let outbound = timeout(Duration::from_secs(2), promoted_rx.recv())
        .await
        .expect("no outbound promoted request")
        .unwrap();
    let enriched: Value = serde_json::from_str(&outbound.payload).unwrap();
    assert_eq!(enriched["samples"][0]["cmoSampleName"], "C-4567-X001-d01");
    assert!(new_rx.try_recv().is_err());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn failed_sample_is_dropped_and_audited() {
    let (bus, audit, pipeline, config) = start_pipeline(StubStore::default()).await;
    let mut out_rx = bus.subscribe(&config.topics.new_request_out);

    let mut failing = xenograft_record("22022_BZ_2", "C-1235");
    failing["naToExtract"] = json!("Protein");
    failing["sampleType"] = Value::Null;
    let request = json!({
        "requestId": "22022_BZ",
        "samples": [xenograft_record("22022_BZ_1", "C-1235"), failing]
    });
    bus.publish(&config.topics.new_request_in, request.to_string())
        .unwrap();

    let outbound = timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("no outbound request")
        .unwrap();
    let enriched: Value = serde_json::from_str(&outbound.payload).unwrap();
    assert_eq!(enriched["samples"].as_array().unwrap().len(), 1);
    audit
        .wait_for(StatusKind::SampleFailedLabelGeneration)
        .await;

    pipeline.shutdown().await;
}

#[tokio::test]
async fn request_without_cmo_samples_is_filtered() {
    let (bus, audit, pipeline, config) = start_pipeline(StubStore::default()).await;
    let mut out_rx = bus.subscribe(&config.topics.new_request_out);

    let request = json!({
        "requestId": "40001_A",
        "samples": [
            { "igoId": "40001_A_1", "cmoPatientId": "C-9", "isCmoSample": false }
        ]
    });
    bus.publish(&config.topics.new_request_in, request.to_string())
        .unwrap();

    audit.wait_for(StatusKind::RequestFiltered).await;
    assert!(out_rx.try_recv().is_err());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn malformed_request_payload_is_audited_as_parsing_error() {
    let (bus, audit, pipeline, config) = start_pipeline(StubStore::default()).await;

    bus.publish(&config.topics.new_request_in, "this is not json")
        .unwrap();

    audit.wait_for(StatusKind::ParsingError).await;
    pipeline.shutdown().await;
}

#[tokio::test]
async fn metadata_correction_keeps_existing_label() {
    // The store already knows this sample under its current label; a
    // correction to unrelated metadata must republish it unchanged.
    let existing = SampleDescriptor {
        primary_id: "22022_BZ_1".to_string(),
        cmo_patient_id: "C-1235".to_string(),
        cmo_sample_name: Some("C-1235-X001-d01".to_string()),
        ..Default::default()
    };
    let mut store = StubStore::default();
    store
        .by_patient
        .insert("C-1235".to_string(), vec![existing]);

    let (bus, _audit, pipeline, config) = start_pipeline(store).await;
    let mut out_rx = bus.subscribe(&config.topics.sample_update_out);

    let mut update = xenograft_record("22022_BZ_1", "C-1235");
    update["cmoSampleName"] = json!("C-1235-X001-d01");
    bus.publish(&config.topics.sample_update_in, update.to_string())
        .unwrap();

    let outbound = timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("no outbound sample")
        .unwrap();
    let sample: Value = serde_json::from_str(&outbound.payload).unwrap();
    assert_eq!(sample["cmoSampleName"], "C-1235-X001-d01");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn material_change_adopts_the_new_label() {
    // Patient context says the next counter is 2; the stored label on the
    // inbound sample is blank, so the freshly computed label is adopted.
    let sibling = SampleDescriptor {
        primary_id: "22022_BZ_9".to_string(),
        cmo_patient_id: "C-1235".to_string(),
        cmo_sample_name: Some("C-1235-X001-d".to_string()),
        ..Default::default()
    };
    let mut store = StubStore::default();
    store.by_patient.insert("C-1235".to_string(), vec![sibling]);

    let (bus, _audit, pipeline, config) = start_pipeline(store).await;
    let mut out_rx = bus.subscribe(&config.topics.sample_update_out);

    let update = xenograft_record("22022_BZ_1", "C-1235");
    bus.publish(&config.topics.sample_update_in, update.to_string())
        .unwrap();

    let outbound = timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("no outbound sample")
        .unwrap();
    let sample: Value = serde_json::from_str(&outbound.payload).unwrap();
    assert_eq!(sample["cmoSampleName"], "C-1235-X002-d01");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn responder_answers_label_previews() {
    let (bus, _audit, pipeline, config) = start_pipeline(StubStore::default()).await;

    let reply = bus
        .request(
            &config.topics.label_request,
            xenograft_record("22022_BZ_1", "C-1235").to_string(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert_eq!(reply, "C-1235-X001-d01");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn responder_reports_generation_failure() {
    let (bus, _audit, pipeline, config) = start_pipeline(StubStore::default()).await;

    let mut record = xenograft_record("22022_BZ_1", "C-1235");
    record["naToExtract"] = json!("Protein");
    let reply = bus
        .request(
            &config.topics.label_request,
            record.to_string(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert!(reply.starts_with("ERROR:"));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn shutdown_drains_and_stops_accepting() {
    let (bus, _audit, pipeline, config) = start_pipeline(StubStore::default()).await;
    let mut out_rx = bus.subscribe(&config.topics.new_request_out);

    let request = json!({
        "requestId": "22022_BZ",
        "samples": [xenograft_record("22022_BZ_1", "C-1235")]
    });
    bus.publish(&config.topics.new_request_in, request.to_string())
        .unwrap();

    // In-flight work completes before the pipeline declares itself stopped
    let outbound = timeout(Duration::from_secs(2), out_rx.recv())
        .await
        .expect("no outbound request")
        .unwrap();
    assert!(outbound.payload.contains("C-1235-X001-d01"));

    pipeline.shutdown().await;

    // Messages published after shutdown go nowhere
    bus.publish(&config.topics.new_request_in, request.to_string())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(out_rx.try_recv().is_err());
}
