//! Short-poll batch reads.
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use beam_broker::Message;
use serde::Serialize;
use std::time::Duration;

use crate::api::error::{ApiError, api_forbidden, api_internal, api_unauthorized, api_unprocessable};
use crate::app::AppState;
use crate::auth::authorize_topic;
use crate::resolve::{ConsumeQuery, consumer_config};

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_PER_MESSAGE_TIMEOUT_MS: u64 = 300;

#[derive(Debug, Serialize)]
struct PolledMessage {
    id: String,
    payload: String,
}

impl From<&Message> for PolledMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
        }
    }
}

pub(crate) async fn poll(
    State(state): State<AppState>,
    Path((persistent, tenant, namespace, topic)): Path<(String, String, String, String)>,
    Query(query): Query<ConsumeQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cfg = consumer_config(
        &state.config,
        &headers,
        (&persistent, &tenant, &namespace, &topic),
        &query,
    )
    .map_err(|err| api_unprocessable(&err.to_string()))?;

    if state.auth.enabled() {
        let subjects = state
            .auth
            .subjects(cfg.token.as_deref())
            .map_err(|err| api_unauthorized(&err.to_string()))?;
        if !authorize_topic(&cfg.topic.fqn(), &subjects, &state.config.super_roles) {
            return Err(api_forbidden("token subject not allowed for tenant"));
        }
    }

    let batch_size = query.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    let per_msg_timeout =
        Duration::from_millis(query.per_message_timeout_ms.unwrap_or(DEFAULT_PER_MESSAGE_TIMEOUT_MS));

    // Run the read on its own task so a panic is contained to this request
    // and surfaces as a join error.
    let consumers = state.consumers.clone();
    let read = tokio::spawn(async move {
        consumers
            .poll_batch(
                &cfg.broker_url,
                cfg.token.as_deref(),
                &cfg.topic,
                &cfg.options.name,
                cfg.options.sub_type,
                batch_size,
                per_msg_timeout,
            )
            .await
    });
    let messages = match read.await {
        Ok(result) => result.map_err(|err| api_internal(&err.to_string()))?,
        Err(join_err) => {
            tracing::error!(error = %join_err, "poll task failed");
            return Err(api_internal("poll failed"));
        }
    };

    if messages.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    metrics::counter!("beam_polled_total").increment(messages.len() as u64);
    let body: Vec<PolledMessage> = messages.iter().map(PolledMessage::from).collect();
    Ok((StatusCode::OK, Json(body)).into_response())
}
