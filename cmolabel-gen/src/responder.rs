//! Request-reply responder
//!
//! Answers synchronous one-sample-at-a-time label queries: upstream
//! producers ask for a pre-publication label preview and receive the plain
//! label string on their reply channel. Nothing on this path reaches an
//! outbound topic.

use crate::pipeline::stage::StageHandler;
use crate::store::SampleStore;
use async_trait::async_trait;
use cmolabel_common::label::LabelEngine;
use cmolabel_common::messaging::{BusMessage, MessageBus};
use cmolabel_common::{Result, SampleDescriptor};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reply-payload prefix marking a failed preview
pub const ERROR_INDICATOR: &str = "ERROR:";

/// Handler behind the responder stage
pub struct LabelRequestResponder {
    engine: LabelEngine,
    store: Arc<dyn SampleStore>,
    bus: MessageBus,
}

impl LabelRequestResponder {
    /// Create a responder replying over `bus`
    pub fn new(store: Arc<dyn SampleStore>, bus: MessageBus) -> Self {
        Self {
            engine: LabelEngine::new(),
            store,
            bus,
        }
    }

    async fn preview(&self, raw: &str) -> std::result::Result<String, String> {
        let record: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| format!("unparseable sample payload: {}", e))?;
        let sample = SampleDescriptor::from_json(&record).map_err(|e| e.to_string())?;

        let existing = self
            .store
            .fetch_existing_samples(&sample.cmo_patient_id)
            .await
            .map_err(|e| e.to_string())?;
        let alt = match sample.alt_id.as_deref() {
            Some(alt_id) if !alt_id.is_empty() => self
                .store
                .fetch_samples_by_alt_id(alt_id)
                .await
                .map_err(|e| e.to_string())?,
            _ => Vec::new(),
        };

        self.engine
            .generate_label(&sample, &existing, &alt)
            .ok_or_else(|| format!("label generation failed for '{}'", sample.primary_id))
    }
}

#[async_trait]
impl StageHandler<BusMessage> for LabelRequestResponder {
    async fn handle(&self, message: BusMessage) -> Result<()> {
        let Some(reply_to) = message.reply_to else {
            warn!("Label request without a reply channel, dropping");
            return Ok(());
        };

        let reply = match self.preview(&message.payload).await {
            Ok(label) => {
                debug!(label = %label, "Answering label preview");
                label
            }
            Err(reason) => {
                warn!(reason = %reason, "Label preview failed");
                format!("{} {}", ERROR_INDICATOR, reason)
            }
        };
        self.bus.reply(&reply_to, reply)
    }
}
