use axum::Router;
use beam_broker::Persistence;
use beam_broker::inprocess::InProcessFactory;
use gateway::app::{AppState, build_router};
use gateway::config::{AuthMode, GatewayConfig};
use std::sync::Arc;

pub const BROKER_URL: &str = "pulsar://testbroker:6650";

#[allow(dead_code)]
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        bind_addr: "127.0.0.1:8085".parse().expect("addr"),
        metrics_bind: "127.0.0.1:8090".parse().expect("addr"),
        default_broker_url: BROKER_URL.to_string(),
        allowed_broker_urls: vec!["pulsar://second:6650".to_string()],
        super_roles: vec!["superuser".to_string()],
        persistence_modes: vec![Persistence::Persistent, Persistence::NonPersistent],
        worker_pool_size: 2,
        token_header: "Authorization".to_string(),
        auth_mode: AuthMode::None,
        jwt_public_key_path: None,
        jwt_hs256_secret: None,
    }
}

#[allow(dead_code)]
pub fn test_app() -> (Router, Arc<InProcessFactory>) {
    app_with_config(test_config())
}

#[allow(dead_code)]
pub fn app_with_config(config: GatewayConfig) -> (Router, Arc<InProcessFactory>) {
    let factory = Arc::new(InProcessFactory::new());
    let state = AppState::new(config, factory.clone()).expect("app state");
    (build_router(state), factory)
}

#[allow(dead_code)]
pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
