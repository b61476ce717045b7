//! Server-sent-event streaming.
//!
//! # Purpose
//! Forwards broker messages to the client as SSE frames in arrival order.
//! Every message is acknowledged before its frame is emitted. When the
//! client goes away the response stream is dropped, which releases the
//! consumer; auto-named subscriptions are removed with it.
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use beam_broker::Message;
use beam_client::ConsumerHandle;
use std::convert::Infallible;

use crate::api::error::{ApiError, api_forbidden, api_internal, api_unauthorized, api_unprocessable};
use crate::app::AppState;
use crate::auth::authorize_topic;
use crate::resolve::{ConsumeQuery, consumer_config};

pub(crate) async fn stream(
    State(state): State<AppState>,
    Path((persistent, tenant, namespace, topic)): Path<(String, String, String, String)>,
    Query(query): Query<ConsumeQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
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

    let handle = state
        .consumers
        .open(
            &cfg.broker_url,
            cfg.token.as_deref(),
            &cfg.topic,
            &cfg.options,
        )
        .await
        .map_err(|err| api_internal(&err.to_string()))?;
    tracing::debug!(topic = %cfg.topic, sub = %cfg.options.name, "sse stream opened");

    // The stream owns the consumer; client disconnect drops it, which
    // detaches (and for auto-named subscriptions removes) the
    // subscription.
    let events = futures::stream::unfold(handle, |mut handle: ConsumerHandle| async move {
        let msg = handle.recv().await?;
        handle.ack(&msg);
        metrics::counter!("beam_streamed_total").increment(1);
        Some((Ok::<Event, Infallible>(event_for(&msg)), handle))
    });

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Sse::new(events),
    ))
}

fn event_for(msg: &Message) -> Event {
    Event::default()
        .id(sanitize_id(&msg.id))
        .data(String::from_utf8_lossy(&msg.payload))
}

/// Message ids must not contain `&`; broker id stringification can leak
/// one in.
fn sanitize_id(id: &str) -> String {
    id.replace('&', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn sanitize_strips_every_ampersand() {
        assert_eq!(sanitize_id("m1&a"), "m1a");
        assert_eq!(sanitize_id("&{13 4 0 0}"), "{13 4 0 0}");
        assert_eq!(sanitize_id("a&b&c"), "abc");
        assert_eq!(sanitize_id("plain"), "plain");
    }

    #[test]
    fn event_carries_sanitized_id_and_payload() {
        let msg = Message {
            id: "m1&a".to_string(),
            payload: Bytes::from_static(b"hello"),
        };
        let frame = format!("{:?}", event_for(&msg));
        assert!(frame.contains("m1a"));
        assert!(frame.contains("hello"));
    }
}
