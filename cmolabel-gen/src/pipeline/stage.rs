//! Processing stage
//!
//! One stage owns one bounded input queue and a fixed pool of homogeneous
//! workers. Lifecycle: Stopped -> Starting (workers spawned, barrier wait
//! until all report ready) -> Running (workers poll the queue with a short
//! timeout) -> Draining (no new input accepted, in-flight queue contents
//! finished) -> Stopped (every worker joined).
//!
//! A caught error while processing one item is logged and the poll loop
//! continues; a worker never dies to a message failure.

use async_trait::async_trait;
use cmolabel_common::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Barrier, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Work applied to every item a stage dequeues
#[async_trait]
pub trait StageHandler<T>: Send + Sync + 'static {
    /// Process one item; an `Err` is logged by the worker and the loop
    /// continues with the next item
    async fn handle(&self, item: T) -> Result<()>;
}

/// Cloneable submit handle onto a stage's bounded queue
pub struct StageQueue<T> {
    name: Arc<str>,
    tx: mpsc::Sender<T>,
    accepting: Arc<AtomicBool>,
}

impl<T> Clone for StageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
            accepting: Arc::clone(&self.accepting),
        }
    }
}

impl<T: Send> StageQueue<T> {
    /// Enqueue an item, failing fast once drain has begun
    pub async fn submit(&self, item: T) -> Result<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        self.tx.send(item).await.map_err(|_| Error::ShuttingDown)
    }

    /// Stage this queue feeds
    pub fn stage_name(&self) -> &str {
        &self.name
    }
}

/// A named stage with its queue and worker pool
pub struct Stage<T> {
    name: Arc<str>,
    queue: Option<StageQueue<T>>,
    accepting: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

enum Polled<T> {
    Item(T),
    Empty,
    Closed,
}

impl<T: Send + 'static> Stage<T> {
    /// Spawn `worker_count` workers and block until every one has reported
    /// ready; no item is processed before the full pool is established
    pub async fn start(
        name: &str,
        worker_count: usize,
        queue_capacity: usize,
        poll_interval: Duration,
        handler: Arc<dyn StageHandler<T>>,
    ) -> Self {
        info!(stage = %name, workers = worker_count, "Starting stage");
        let name: Arc<str> = Arc::from(name);
        let accepting = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel::<T>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let barrier = Arc::new(Barrier::new(worker_count + 1));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let name = Arc::clone(&name);
            let rx = Arc::clone(&rx);
            let barrier = Arc::clone(&barrier);
            let accepting = Arc::clone(&accepting);
            let handler = Arc::clone(&handler);

            workers.push(tokio::spawn(async move {
                barrier.wait().await;
                debug!(stage = %name, worker = worker_id, "Worker ready");

                loop {
                    let polled = {
                        let mut rx = rx.lock().await;
                        match tokio::time::timeout(poll_interval, rx.recv()).await {
                            Ok(Some(item)) => Polled::Item(item),
                            Ok(None) => Polled::Closed,
                            Err(_) => Polled::Empty,
                        }
                    };

                    match polled {
                        Polled::Item(item) => {
                            if let Err(e) = handler.handle(item).await {
                                error!(
                                    stage = %name,
                                    worker = worker_id,
                                    error = %e,
                                    "Message processing failed, continuing"
                                );
                            }
                        }
                        Polled::Closed => break,
                        Polled::Empty => {
                            if !accepting.load(Ordering::Acquire) {
                                // Drain is underway and the poll came back
                                // empty: finish any stragglers and stop
                                loop {
                                    let leftover = rx.lock().await.try_recv();
                                    match leftover {
                                        Ok(item) => {
                                            if let Err(e) = handler.handle(item).await {
                                                error!(
                                                    stage = %name,
                                                    worker = worker_id,
                                                    error = %e,
                                                    "Message processing failed, continuing"
                                                );
                                            }
                                        }
                                        Err(_) => break,
                                    }
                                }
                                break;
                            }
                        }
                    }
                }

                debug!(stage = %name, worker = worker_id, "Worker stopped");
            }));
        }

        // Stage is live only once the whole pool has checked in
        barrier.wait().await;
        info!(stage = %name, "Stage running");

        let queue = StageQueue {
            name: Arc::clone(&name),
            tx,
            accepting: Arc::clone(&accepting),
        };
        Self {
            name,
            queue: Some(queue),
            accepting,
            workers,
        }
    }

    /// Submit handle for this stage
    pub fn queue(&self) -> StageQueue<T> {
        self.queue
            .clone()
            .expect("stage queue is present until shutdown")
    }

    /// Cooperative drain: refuse new input, let workers finish in-flight
    /// queue contents, then block until every worker has signaled
    /// completion
    pub async fn shutdown(mut self) {
        info!(stage = %self.name, "Draining stage");
        self.accepting.store(false, Ordering::Release);
        self.queue.take();

        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(stage = %self.name, error = %e, "Worker task panicked");
            }
        }
        info!(stage = %self.name, "Stage stopped");
    }
}
