//! In-process message bus
//!
//! Topic-addressed publish/subscribe plus request/reply, standing in for
//! the external messaging gateway at its interface boundary. Payloads are
//! JSON-encoded text; the bus itself never interprets them.
//!
//! Built on per-topic `tokio::broadcast` channels:
//! - Non-blocking publish (slow subscribers don't block producers)
//! - Multiple concurrent subscribers per topic
//! - Automatic cleanup when subscribers drop
//!
//! Request/reply rides on the same primitives: the requester subscribes to
//! a unique inbox topic, attaches it as `reply_to`, and waits (bounded) for
//! the first message to arrive there.

use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// One message on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published to
    pub subject: String,
    /// Inbox topic to reply to, for request/reply traffic
    pub reply_to: Option<String>,
    /// JSON-encoded payload text
    pub payload: String,
}

/// Topic-addressed message bus
#[derive(Clone)]
pub struct MessageBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<BusMessage>>>>,
    capacity: usize,
}

impl MessageBus {
    /// Create a bus; `capacity` bounds each topic's broadcast buffer
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    fn sender(&self, subject: &str) -> broadcast::Sender<BusMessage> {
        let mut topics = self.topics.lock().expect("bus topic map poisoned");
        topics
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to all future messages on `subject`
    pub fn subscribe(&self, subject: &str) -> broadcast::Receiver<BusMessage> {
        self.sender(subject).subscribe()
    }

    /// Publish a payload to `subject`
    ///
    /// A topic with no subscribers is not an error; the message is simply
    /// dropped (and noted at debug level).
    pub fn publish(&self, subject: &str, payload: impl Into<String>) -> Result<()> {
        self.publish_message(BusMessage {
            subject: subject.to_string(),
            reply_to: None,
            payload: payload.into(),
        })
    }

    /// Publish a prepared message, preserving its `reply_to`
    pub fn publish_message(&self, message: BusMessage) -> Result<()> {
        let sender = self.sender(&message.subject);
        if sender.send(message.clone()).is_err() {
            debug!(subject = %message.subject, "No subscribers for message");
        }
        Ok(())
    }

    /// Synchronous request over `subject`, bounded by `timeout`
    ///
    /// Returns the reply payload from whichever responder answers first.
    pub async fn request(
        &self,
        subject: &str,
        payload: impl Into<String>,
        timeout: Duration,
    ) -> Result<String> {
        let inbox = format!("_inbox.{}", Uuid::new_v4());
        let mut rx = self.subscribe(&inbox);

        self.publish_message(BusMessage {
            subject: subject.to_string(),
            reply_to: Some(inbox),
            payload: payload.into(),
        })?;

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Ok(message)) => Ok(message.payload),
            Ok(Err(_)) => Err(Error::Transport(format!(
                "reply channel closed for request on '{}'",
                subject
            ))),
            Err(_) => Err(Error::Transport(format!(
                "request on '{}' timed out after {:?}",
                subject, timeout
            ))),
        }
    }

    /// Send a reply payload to a request's inbox
    pub fn reply(&self, reply_to: &str, payload: impl Into<String>) -> Result<()> {
        self.publish(reply_to, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = MessageBus::new(16);
        let mut rx_a = bus.subscribe("topic.one");
        let mut rx_b = bus.subscribe("topic.one");
        let mut rx_other = bus.subscribe("topic.two");

        bus.publish("topic.one", "{\"k\":1}").unwrap();

        assert_eq!(rx_a.recv().await.unwrap().payload, "{\"k\":1}");
        assert_eq!(rx_b.recv().await.unwrap().payload, "{\"k\":1}");
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = MessageBus::new(16);
        assert!(bus.publish("nobody.listens", "x").is_ok());
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let bus = MessageBus::new(16);
        let mut rx = bus.subscribe("echo");

        let responder_bus = bus.clone();
        tokio::spawn(async move {
            let message = rx.recv().await.unwrap();
            let reply_to = message.reply_to.unwrap();
            responder_bus
                .reply(&reply_to, format!("echo:{}", message.payload))
                .unwrap();
        });

        let reply = bus
            .request("echo", "hello", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, "echo:hello");
    }

    #[tokio::test]
    async fn request_times_out_without_responder() {
        let bus = MessageBus::new(16);
        // Keep the topic alive so the publish itself succeeds
        let _rx = bus.subscribe("slow");
        let result = bus.request("slow", "x", Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
