//! Sample store collaborator
//!
//! The persistent sample store lives behind the messaging gateway; this
//! module specifies its contract and provides the bus-backed client. Both
//! lookups return an empty list (never an error) when nothing matches.

use async_trait::async_trait;
use cmolabel_common::messaging::MessageBus;
use cmolabel_common::{Error, Result, SampleDescriptor};
use serde_json::{json, Value};
use std::time::Duration;

/// Query service over previously persisted samples
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// All samples recorded for a patient (the sample-type counter space)
    async fn fetch_existing_samples(&self, patient_id: &str) -> Result<Vec<SampleDescriptor>>;

    /// All samples sharing an alternate identifier (the nucleic-acid
    /// counter space)
    async fn fetch_samples_by_alt_id(&self, alt_id: &str) -> Result<Vec<SampleDescriptor>>;
}

/// Sample store client issuing synchronous request/reply calls over the bus
pub struct BusSampleStore {
    bus: MessageBus,
    patient_subject: String,
    alt_id_subject: String,
    timeout: Duration,
}

impl BusSampleStore {
    /// Create a client for the given request subjects
    pub fn new(
        bus: MessageBus,
        patient_subject: String,
        alt_id_subject: String,
        timeout: Duration,
    ) -> Self {
        Self {
            bus,
            patient_subject,
            alt_id_subject,
            timeout,
        }
    }

    async fn fetch(&self, subject: &str, query: Value) -> Result<Vec<SampleDescriptor>> {
        let reply = self
            .bus
            .request(subject, query.to_string(), self.timeout)
            .await?;

        let records: Vec<Value> = serde_json::from_str(&reply)
            .map_err(|e| Error::Transport(format!("malformed store reply on '{}': {}", subject, e)))?;
        records
            .iter()
            .map(SampleDescriptor::from_json)
            .collect::<Result<Vec<_>>>()
    }
}

#[async_trait]
impl SampleStore for BusSampleStore {
    async fn fetch_existing_samples(&self, patient_id: &str) -> Result<Vec<SampleDescriptor>> {
        self.fetch(&self.patient_subject, json!({ "cmoPatientId": patient_id }))
            .await
    }

    async fn fetch_samples_by_alt_id(&self, alt_id: &str) -> Result<Vec<SampleDescriptor>> {
        self.fetch(&self.alt_id_subject, json!({ "altId": alt_id }))
            .await
    }
}
