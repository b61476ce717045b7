//! Ingestion worker pool.
//!
//! # Purpose
//! A fixed set of long-lived workers consuming one bounded queue. Each
//! worker owns a pre-allocated buffer sized to the broker's message limit
//! plus one byte, so reading strictly more than the limit is observable as
//! overflow. Submission awaits queue capacity; that wait is the admission
//! control for the ingestion endpoint. Tasks are never cancelled once
//! dequeued.
use axum::body::BodyDataStream;
use axum::http::HeaderMap;
use beam_broker::TopicAddress;
use beam_client::ProducerGateway;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::api::error::{ApiError, api_internal};
use crate::auth::TokenAuth;
use crate::config::GatewayConfig;
use crate::resolve::ResolveError;

// 5 MiB + 1: the broker's message size limit, plus one byte so overflow is
// distinguishable from an exactly-full buffer.
pub const WORKER_BUFFER_SIZE: usize = 5 * 1024 * 1024 + 1;

/// Shared dependencies the workers need to finish a request.
#[derive(Clone)]
pub struct IngestContext {
    pub config: Arc<GatewayConfig>,
    pub auth: Arc<TokenAuth>,
    pub producers: Arc<ProducerGateway>,
}

/// One ingestion request, handed to exactly one worker. The HTTP handler
/// blocks on `done` so the response reflects the worker's outcome.
pub struct IngestTask {
    pub method: String,
    pub request_uri: String,
    pub http_version: String,
    pub headers: HeaderMap,
    pub include_request_line: bool,
    pub include_headers: bool,
    pub gzip: bool,
    pub fire_and_forget: bool,
    pub route_topic: Result<TopicAddress, ResolveError>,
    pub body: BodyDataStream,
    pub done: oneshot::Sender<Result<(), ApiError>>,
}

#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<IngestTask>,
    depth: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing a queue of the same capacity.
    pub fn start(size: usize, ctx: IngestContext) -> Self {
        let (tx, rx) = mpsc::channel::<IngestTask>(size);
        let rx = Arc::new(Mutex::new(rx));
        let depth = Arc::new(AtomicUsize::new(0));
        tracing::info!(size, "starting ingestion worker pool");
        for worker in 0..size {
            let rx = rx.clone();
            let ctx = ctx.clone();
            let depth = depth.clone();
            tokio::spawn(async move {
                let mut buffer: Vec<u8> = Vec::with_capacity(WORKER_BUFFER_SIZE);
                loop {
                    // Hold the receiver lock only while waiting; processing
                    // happens with the lock released so other workers can
                    // pick up queued tasks.
                    let task = { rx.lock().await.recv().await };
                    let Some(task) = task else { break };
                    let queued = depth.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
                    metrics::gauge!("beam_worker_queue_depth").set(queued as f64);
                    crate::api::firehose::execute(task, &ctx, &mut buffer).await;
                }
                tracing::debug!(worker, "ingestion worker stopped");
            });
        }
        Self { tx, depth }
    }

    /// Enqueue a task, waiting for a free slot when the queue is full.
    pub async fn submit(&self, task: IngestTask) -> Result<(), ApiError> {
        let queued = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("beam_worker_queue_depth").set(queued as f64);
        self.tx.send(task).await.map_err(|_| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            api_internal("ingestion worker pool is not running")
        })
    }
}
