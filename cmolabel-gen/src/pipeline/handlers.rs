//! Stage handlers
//!
//! The new-request and promoted-request stages wrap the label engine
//! identically and differ only in their outbound topic, so both are
//! instances of one [`RequestHandler`]. Single-sample corrections go
//! through [`SampleUpdateHandler`], and everything leaving the service
//! funnels through the publisher stage's [`PublishHandler`].

use crate::audit::{AuditLog, StatusKind};
use crate::pipeline::stage::{StageHandler, StageQueue};
use crate::store::SampleStore;
use async_trait::async_trait;
use cmolabel_common::label::LabelEngine;
use cmolabel_common::messaging::{BusMessage, MessageBus};
use cmolabel_common::{ProcessingRequest, Result, SampleDescriptor};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A message bound for an outbound topic
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Destination topic
    pub subject: String,
    /// JSON payload text
    pub payload: String,
}

/// Publisher stage handler: pushes outbound messages onto the bus
pub struct PublishHandler {
    bus: MessageBus,
}

impl PublishHandler {
    /// Create a publisher over `bus`
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl StageHandler<OutboundMessage> for PublishHandler {
    async fn handle(&self, item: OutboundMessage) -> Result<()> {
        debug!(subject = %item.subject, "Publishing outbound message");
        self.bus.publish(&item.subject, item.payload)
    }
}

/// Request-scoped label generation, parametrized by outbound topic
pub struct RequestHandler {
    engine: LabelEngine,
    store: Arc<dyn SampleStore>,
    audit: Arc<dyn AuditLog>,
    publisher: StageQueue<OutboundMessage>,
    outbound_subject: String,
}

impl RequestHandler {
    /// Create a handler publishing enriched requests to `outbound_subject`
    pub fn new(
        store: Arc<dyn SampleStore>,
        audit: Arc<dyn AuditLog>,
        publisher: StageQueue<OutboundMessage>,
        outbound_subject: String,
    ) -> Self {
        Self {
            engine: LabelEngine::new(),
            store,
            audit,
            publisher,
            outbound_subject,
        }
    }

    /// Fetch the two context lists and generate a label for `sample`
    ///
    /// Store failures propagate; they are caught at the worker level.
    async fn generate_for(&self, sample: &SampleDescriptor) -> Result<Option<String>> {
        let existing = self
            .store
            .fetch_existing_samples(&sample.cmo_patient_id)
            .await?;
        let alt = match sample.alt_id.as_deref() {
            Some(alt_id) if !alt_id.is_empty() => {
                self.store.fetch_samples_by_alt_id(alt_id).await?
            }
            _ => Vec::new(),
        };
        Ok(self.engine.generate_label(sample, &existing, &alt))
    }
}

#[async_trait]
impl StageHandler<BusMessage> for RequestHandler {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let raw = message.payload;
        let mut request = match ProcessingRequest::from_str(&raw) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Dropping undeserializable request payload");
                self.audit.log_status(&raw, StatusKind::ParsingError).await;
                return Ok(());
            }
        };

        let mut processed = Vec::new();
        let mut cmo_samples = 0usize;
        let mut failed = 0usize;

        for record in &request.samples {
            let mut sample = match SampleDescriptor::from_json(record) {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(request_id = %request.request_id, error = %e, "Skipping unconvertible sample record");
                    self.audit
                        .log_status(&record.to_string(), StatusKind::SampleMissing)
                        .await;
                    continue;
                }
            };
            if !sample.is_cmo_sample {
                debug!(
                    request_id = %request.request_id,
                    primary_id = %sample.primary_id,
                    "Skipping non-CMO sample"
                );
                continue;
            }
            cmo_samples += 1;

            match self.generate_for(&sample).await? {
                Some(label) => {
                    let status = self.engine.generate_validation_status(&sample);
                    if !status.valid {
                        warn!(
                            primary_id = %sample.primary_id,
                            label = %label,
                            failures = ?status.failures,
                            "Label generated with validation failures"
                        );
                    }
                    sample.cmo_sample_name = Some(label);
                    processed.push(serde_json::to_value(&sample)?);
                }
                None => {
                    failed += 1;
                    self.audit
                        .log_status(&record.to_string(), StatusKind::SampleFailedLabelGeneration)
                        .await;
                }
            }
        }

        if cmo_samples == 0 {
            info!(request_id = %request.request_id, "Request carries no CMO samples, not republishing");
            self.audit.log_status(&raw, StatusKind::RequestFiltered).await;
            return Ok(());
        }
        if failed > 0 {
            warn!(
                request_id = %request.request_id,
                failed,
                succeeded = processed.len(),
                "Republishing request with partial results"
            );
        }

        request.samples = processed;
        self.publisher
            .submit(OutboundMessage {
                subject: self.outbound_subject.clone(),
                payload: serde_json::to_string(&request)?,
            })
            .await
    }
}

/// Single-sample correction handler
///
/// Regenerates the label against the current store state and adopts it only
/// when it materially differs from the one already assigned; the sample is
/// republished either way.
pub struct SampleUpdateHandler {
    engine: LabelEngine,
    store: Arc<dyn SampleStore>,
    audit: Arc<dyn AuditLog>,
    publisher: StageQueue<OutboundMessage>,
    outbound_subject: String,
}

impl SampleUpdateHandler {
    /// Create a handler publishing resolved samples to `outbound_subject`
    pub fn new(
        store: Arc<dyn SampleStore>,
        audit: Arc<dyn AuditLog>,
        publisher: StageQueue<OutboundMessage>,
        outbound_subject: String,
    ) -> Self {
        Self {
            engine: LabelEngine::new(),
            store,
            audit,
            publisher,
            outbound_subject,
        }
    }
}

#[async_trait]
impl StageHandler<BusMessage> for SampleUpdateHandler {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let raw = message.payload;
        let record: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Dropping undeserializable sample-update payload");
                self.audit.log_status(&raw, StatusKind::ParsingError).await;
                return Ok(());
            }
        };
        let mut sample = match SampleDescriptor::from_json(&record) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Dropping unconvertible sample-update record");
                self.audit.log_status(&raw, StatusKind::ParsingError).await;
                return Ok(());
            }
        };

        let existing = self
            .store
            .fetch_existing_samples(&sample.cmo_patient_id)
            .await?;
        let alt = match sample.alt_id.as_deref() {
            Some(alt_id) if !alt_id.is_empty() => {
                self.store.fetch_samples_by_alt_id(alt_id).await?
            }
            _ => Vec::new(),
        };

        let Some(new_label) = self.engine.generate_label(&sample, &existing, &alt) else {
            warn!(primary_id = %sample.primary_id, "Label regeneration failed for sample update");
            self.audit
                .log_status(&raw, StatusKind::SampleFailedLabelGeneration)
                .await;
            return Ok(());
        };

        let current = sample.cmo_sample_name.clone().unwrap_or_default();
        // An uncomparable pair is a data-integrity error; let the worker
        // surface it rather than guessing
        if self.engine.requires_label_update(&new_label, &current)? {
            info!(
                primary_id = %sample.primary_id,
                old = %current,
                new = %new_label,
                "Adopting updated label"
            );
            sample.cmo_sample_name = Some(new_label);
        } else {
            debug!(primary_id = %sample.primary_id, "Keeping previously assigned label");
        }

        self.publisher
            .submit(OutboundMessage {
                subject: self.outbound_subject.clone(),
                payload: serde_json::to_string(&sample)?,
            })
            .await
    }
}
