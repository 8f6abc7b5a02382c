//! Event-processing pipeline
//!
//! One `PipelineContext` object, constructed at startup, owns every stage,
//! its queues, its worker handles, and the shutdown signal. No global
//! state: multiple independent pipelines can coexist in one process, which
//! is also what makes the pipeline testable in isolation.
//!
//! Topology: three inbound stages (new-request, promoted-request,
//! sample-update) plus the request-reply responder, all funneling outbound
//! traffic through a single publisher stage. Forwarder tasks bridge bus
//! subscriptions onto stage queues and stop accepting work the moment
//! shutdown begins.

pub mod handlers;
pub mod stage;

use crate::audit::AuditLog;
use crate::responder::LabelRequestResponder;
use crate::store::SampleStore;
use anyhow::Result;
use cmolabel_common::config::ServiceConfig;
use cmolabel_common::messaging::{BusMessage, MessageBus};
use handlers::{OutboundMessage, PublishHandler, RequestHandler, SampleUpdateHandler};
use stage::{Stage, StageQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The assembled pipeline
pub struct PipelineContext {
    new_request: Stage<BusMessage>,
    promoted_request: Stage<BusMessage>,
    sample_update: Stage<BusMessage>,
    responder: Stage<BusMessage>,
    publisher: Stage<OutboundMessage>,
    forwarders: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl PipelineContext {
    /// Build and start every stage, returning once all worker pools are
    /// live and subscribed
    pub async fn start(
        config: &ServiceConfig,
        bus: MessageBus,
        store: Arc<dyn SampleStore>,
        audit: Arc<dyn AuditLog>,
    ) -> Result<Self> {
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let capacity = config.queue_capacity;
        info!("Starting label-generation pipeline");

        // Publisher first: every other stage submits into it
        let publisher = Stage::start(
            "publisher",
            config.workers.publisher,
            capacity,
            poll_interval,
            Arc::new(PublishHandler::new(bus.clone())),
        )
        .await;

        let new_request = Stage::start(
            "new-request",
            config.workers.new_request,
            capacity,
            poll_interval,
            Arc::new(RequestHandler::new(
                Arc::clone(&store),
                Arc::clone(&audit),
                publisher.queue(),
                config.topics.new_request_out.clone(),
            )),
        )
        .await;

        let promoted_request = Stage::start(
            "promoted-request",
            config.workers.promoted_request,
            capacity,
            poll_interval,
            Arc::new(RequestHandler::new(
                Arc::clone(&store),
                Arc::clone(&audit),
                publisher.queue(),
                config.topics.promoted_request_out.clone(),
            )),
        )
        .await;

        let sample_update = Stage::start(
            "sample-update",
            config.workers.sample_update,
            capacity,
            poll_interval,
            Arc::new(SampleUpdateHandler::new(
                Arc::clone(&store),
                Arc::clone(&audit),
                publisher.queue(),
                config.topics.sample_update_out.clone(),
            )),
        )
        .await;

        let responder = Stage::start(
            "responder",
            config.workers.responder,
            capacity,
            poll_interval,
            Arc::new(LabelRequestResponder::new(Arc::clone(&store), bus.clone())),
        )
        .await;

        let (shutdown_tx, _) = watch::channel(false);
        let mut forwarders = Vec::new();
        for (topic, queue) in [
            (&config.topics.new_request_in, new_request.queue()),
            (&config.topics.promoted_request_in, promoted_request.queue()),
            (&config.topics.sample_update_in, sample_update.queue()),
            (&config.topics.label_request, responder.queue()),
        ] {
            forwarders.push(spawn_forwarder(
                &bus,
                topic,
                queue,
                shutdown_tx.subscribe(),
            ));
        }

        info!("Pipeline running");
        Ok(Self {
            new_request,
            promoted_request,
            sample_update,
            responder,
            publisher,
            forwarders,
            shutdown_tx,
        })
    }

    /// Cooperative drain of the whole pipeline
    ///
    /// Forwarders stop first so no new inbound work is accepted, then
    /// stages drain and join in registration order, publisher last so that
    /// results produced during the drain still go out.
    pub async fn shutdown(self) {
        info!("Pipeline shutdown initiated");
        let _ = self.shutdown_tx.send(true);
        for forwarder in self.forwarders {
            let _ = forwarder.await;
        }

        self.new_request.shutdown().await;
        self.promoted_request.shutdown().await;
        self.sample_update.shutdown().await;
        self.responder.shutdown().await;
        self.publisher.shutdown().await;
        info!("Pipeline stopped");
    }
}

/// Bridge one bus subscription onto one stage queue
fn spawn_forwarder(
    bus: &MessageBus,
    topic: &str,
    queue: StageQueue<BusMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe(topic);
    let topic = topic.to_string();
    tokio::spawn(async move {
        debug!(topic = %topic, stage = queue.stage_name(), "Forwarder attached");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                received = rx.recv() => match received {
                    Ok(message) => {
                        if let Err(e) = queue.submit(message).await {
                            warn!(topic = %topic, error = %e, "Dropping inbound message");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(topic = %topic, missed, "Subscription lagged, messages lost");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!(topic = %topic, "Forwarder detached");
    })
}
