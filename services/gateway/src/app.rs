//! Gateway HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures request tracing, and defines the
//! shared application state injected into handlers.
use axum::Router;
use axum::routing::{get, post};
use beam_broker::ConnectionFactory;
use beam_client::{ConnectionPool, ConsumerGateway, ProducerGateway};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::TokenAuth;
use crate::config::GatewayConfig;
use crate::workerpool::{IngestContext, WorkerPool};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub auth: Arc<TokenAuth>,
    pub producers: Arc<ProducerGateway>,
    pub consumers: Arc<ConsumerGateway>,
    pub workers: WorkerPool,
}

impl AppState {
    /// Wire the gateways and start the worker pool. Must run inside the
    /// runtime; the pool spawns its workers here.
    pub fn new(config: GatewayConfig, factory: Arc<dyn ConnectionFactory>) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let auth = Arc::new(TokenAuth::from_config(&config)?);
        let connections = Arc::new(ConnectionPool::new(factory));
        let producers = Arc::new(ProducerGateway::new(connections.clone()));
        let consumers = Arc::new(ConsumerGateway::new(connections));
        let workers = WorkerPool::start(
            config.worker_pool_size,
            IngestContext {
                config: config.clone(),
                auth: auth.clone(),
                producers: producers.clone(),
            },
        );
        Ok(Self {
            config,
            auth,
            producers,
            consumers,
            workers,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .route("/status", get(api::status::status))
        .route(
            "/v2/firehose/:persistent/:tenant/:namespace/:topic",
            post(api::firehose::receive),
        )
        .route(
            "/v2/sse/:persistent/:tenant/:namespace/:topic",
            get(api::sse::stream),
        )
        .route(
            "/v2/poll/:persistent/:tenant/:namespace/:topic",
            get(api::poll::poll),
        )
        .layer(trace_layer)
        .with_state(state)
}
