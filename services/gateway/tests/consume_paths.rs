mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use beam_broker::TopicAddress;
use bytes::Bytes;
use common::{BROKER_URL, read_json, test_app};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tower::ServiceExt;

fn topic() -> TopicAddress {
    TopicAddress::from_parts("persistent", "t1", "ns", "t").expect("topic")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

/// Read the SSE body until `frames` blank-line-terminated events arrived.
/// Returns the remaining stream so the caller controls when the client
/// "disconnects".
async fn read_sse_frames(
    body: Body,
    frames: usize,
) -> (String, axum::body::BodyDataStream) {
    let mut stream = body.into_data_stream();
    let mut text = String::new();
    while text.matches("\n\n").count() < frames {
        let chunk = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("sse frame within deadline")
            .expect("stream open")
            .expect("chunk");
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    (text, stream)
}

#[tokio::test]
async fn poll_returns_backlog_as_json() {
    let (app, factory) = test_app();
    let broker = factory.broker(BROKER_URL);
    broker.publish(&topic().fqn(), Bytes::from_static(b"first"));
    broker.publish(&topic().fqn(), Bytes::from_static(b"second"));

    let started = Instant::now();
    let response = app
        .oneshot(get(
            "/v2/poll/persistent/t1/ns/t?perMessageTimeoutMs=100&SubscriptionName=poll5",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(100));

    let body = read_json(response).await;
    let items = body.as_array().expect("array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["payload"], "first");
    assert_eq!(items[1]["payload"], "second");
    assert!(items[0]["id"].as_str().is_some_and(|id| !id.is_empty()));

    // Each returned message was acked, and the named subscription remains.
    assert_eq!(broker.acked_count(&topic().fqn(), "poll5"), 2);
    assert_eq!(broker.subscription_names(&topic().fqn()), vec!["poll5"]);
}

#[tokio::test]
async fn poll_without_messages_is_no_content() {
    let (app, _) = test_app();
    let response = app
        .oneshot(get("/v2/poll/persistent/t1/ns/t?perMessageTimeoutMs=50"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn poll_caps_at_batch_size() {
    let (app, factory) = test_app();
    let broker = factory.broker(BROKER_URL);
    for i in 0..5u8 {
        broker.publish(&topic().fqn(), Bytes::copy_from_slice(&[b'0' + i]));
    }

    let response = app
        .oneshot(get(
            "/v2/poll/persistent/t1/ns/t?batchSize=3&perMessageTimeoutMs=50",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body.as_array().expect("array").len(), 3);
}

#[tokio::test]
async fn poll_resolver_failures_are_unprocessable() {
    let (app, _) = test_app();
    let response = app
        .clone()
        .oneshot(get("/v2/poll/bogus/t1/ns/t"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Short subscription names are rejected the same way.
    let response = app
        .clone()
        .oneshot(get("/v2/poll/persistent/t1/ns/t?SubscriptionName=abc"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The consume endpoints report unauthorized URLs as resolver failures.
    let request = Request::builder()
        .method("GET")
        .uri("/v2/poll/persistent/t1/ns/t")
        .header("PulsarUrl", "pulsar://evil:6650")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn sse_streams_messages_in_order_with_acks() {
    let (app, factory) = test_app();
    let broker = factory.broker(BROKER_URL);

    let response = app
        .oneshot(get("/v2/sse/persistent/t1/ns/t"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").expect("content type"),
        "text/event-stream"
    );
    assert_eq!(
        response.headers().get("cache-control").expect("cache control"),
        "no-cache"
    );
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .expect("cors"),
        "*"
    );

    // The consumer is attached once the response is out; the subscription
    // carries the generated non-resumable name.
    let subs = broker.subscription_names(&topic().fqn());
    assert_eq!(subs.len(), 1);
    let sub_name = subs[0].clone();
    assert!(sub_name.starts_with("non-resumable-"));

    for payload in [b"m-one" as &[u8], b"m-two", b"m-three"] {
        broker.publish(&topic().fqn(), Bytes::copy_from_slice(payload));
    }

    let (text, rest) = read_sse_frames(response.into_body(), 3).await;
    let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
    assert_eq!(frames.len(), 3);
    for (frame, payload) in frames.iter().zip(["m-one", "m-two", "m-three"]) {
        assert!(frame.contains("id: "), "missing id line in {frame}");
        assert!(!frame.contains('&'));
        assert!(
            frame.contains(&format!("data: {payload}")),
            "missing payload in {frame}"
        );
    }

    // Every delivered message was acked before its frame went out.
    assert_eq!(broker.acked_count(&topic().fqn(), &sub_name), 3);

    // Client disconnect: dropping the body releases the consumer and
    // removes the auto-named subscription.
    drop(rest);
    assert!(broker.subscription_names(&topic().fqn()).is_empty());
}

#[tokio::test]
async fn sse_named_subscription_survives_disconnect() {
    let (app, factory) = test_app();
    let broker = factory.broker(BROKER_URL);

    let response = app
        .oneshot(get("/v2/sse/persistent/t1/ns/t?SubscriptionName=keeper"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    drop(response);
    assert_eq!(broker.subscription_names(&topic().fqn()), vec!["keeper"]);
}

#[tokio::test]
async fn sse_resolver_failures_are_unprocessable() {
    let (app, _) = test_app();
    let response = app
        .clone()
        .oneshot(get("/v2/sse/bogus/t1/ns/t"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(get("/v2/sse/persistent/t1/ns/t?SubscriptionType=keyshared"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn sse_busy_exclusive_subscription_is_server_error() {
    let (app, _) = test_app();
    let first = app
        .clone()
        .oneshot(get("/v2/sse/persistent/t1/ns/t?SubscriptionName=locked"))
        .await
        .expect("first");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(get("/v2/sse/persistent/t1/ns/t?SubscriptionName=locked"))
        .await
        .expect("second");
    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    drop(first);
}

#[tokio::test]
async fn sse_earliest_position_replays_backlog() {
    let (app, factory) = test_app();
    let broker = factory.broker(BROKER_URL);
    broker.publish(&topic().fqn(), Bytes::from_static(b"replayed"));

    let response = app
        .oneshot(get(
            "/v2/sse/persistent/t1/ns/t?SubscriptionInitialPosition=earliest",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let (text, _rest) = read_sse_frames(response.into_body(), 1).await;
    assert!(text.contains("data: replayed"));
}
