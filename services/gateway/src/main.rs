// Beam Gateway (HTTP)
// -------------------
// HTTP bridge to a Pulsar-style broker: clients POST payloads into topics
// through the firehose endpoint, and read them back via short polls or a
// server-sent-event stream. Credentials, broker URL, and the target topic
// are resolved per request from headers and route variables.
//
// The binary wires the in-process broker factory; a network driver for a
// remote cluster plugs into the same connection traits.
use anyhow::Context;
use beam_broker::inprocess::InProcessFactory;
use gateway::{app, config, observability};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let metrics_handle = observability::init_observability();
    let config = config::GatewayConfig::from_env_or_yaml()?;
    tracing::info!(
        bind = %config.bind_addr,
        broker = %config.default_broker_url,
        workers = config.worker_pool_size,
        "starting beam gateway"
    );

    let metrics_bind = config.metrics_bind;
    let state = app::AppState::new(config, Arc::new(InProcessFactory::new()))?;
    let bind_addr = state.config.bind_addr;
    let router = app::build_router(state);

    tokio::spawn(async move {
        if let Err(err) = observability::serve_metrics(metrics_bind, metrics_handle).await {
            tracing::error!(error = %err, "metrics listener failed");
        }
    });

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
