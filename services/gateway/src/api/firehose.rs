//! Firehose ingestion handler.
//!
//! # Purpose
//! Accepts a POST, assembles the message payload on a pool worker
//! (optional HTTP metadata prefix, optional gzip decode, bounded by the
//! worker buffer), and produces it to the resolved topic.
//!
//! # Key invariants
//! - The HTTP handler returns only after the worker signals completion.
//! - A framed payload that reaches the buffer limit fails with 500 and is
//!   never produced.
//! - The metadata prefix is `METHOD SP URI SP VERSION CRLF`, then one
//!   `name: value CRLF` line per header (first value only, order
//!   unspecified), then `CRLF CRLF` before the body.
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use bytes::Bytes;
use flate2::write::GzDecoder;
use futures::StreamExt;
use serde::Deserialize;
use std::io::Write;
use tokio::sync::oneshot;

use crate::api::error::{
    ApiError, api_forbidden, api_internal, api_unauthorized, api_unavailable, api_unprocessable,
};
use crate::app::AppState;
use crate::auth::authorize_topic;
use crate::resolve::{effective_topic, resolve_receiver, topic_from_route};
use crate::workerpool::{IngestContext, IngestTask, WORKER_BUFFER_SIZE};

const CRLF: &[u8] = b"\r\n";
const OVERFLOW_MESSAGE: &str = "Buffer overflow";

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    #[serde(rename = "includeRequestLine")]
    include_request_line: Option<String>,
    #[serde(rename = "includeHeaders")]
    include_headers: Option<String>,
    mode: Option<String>,
}

// Flag params are truthy whenever present with any value but "false".
fn flag(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| v != "false")
}

pub(crate) async fn receive(
    State(state): State<AppState>,
    Path((persistent, tenant, namespace, topic)): Path<(String, String, String, String)>,
    Query(query): Query<IngestQuery>,
    request: Request,
) -> Result<StatusCode, ApiError> {
    let method = request.method().to_string();
    let request_uri = request.uri().to_string();
    let http_version = format!("{:?}", request.version());
    let headers = request.headers().clone();
    let gzip = headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes() == b"gzip");
    let route_topic = topic_from_route(&persistent, &tenant, &namespace, &topic);

    let (done, outcome) = oneshot::channel();
    let task = IngestTask {
        method,
        request_uri,
        http_version,
        headers,
        include_request_line: flag(&query.include_request_line),
        include_headers: flag(&query.include_headers),
        gzip,
        fire_and_forget: query.mode.as_deref() == Some("async"),
        route_topic,
        body: request.into_body().into_data_stream(),
        done,
    };
    state.workers.submit(task).await?;
    match outcome.await {
        Ok(result) => result.map(|_| StatusCode::OK),
        // The worker went away without reporting; treat as an internal
        // failure rather than hanging the request.
        Err(_) => Err(api_internal("ingestion worker failed")),
    }
}

/// Worker-side entry point: run the task and signal the waiting handler.
pub(crate) async fn execute(mut task: IngestTask, ctx: &IngestContext, buffer: &mut Vec<u8>) {
    let result = run(&mut task, ctx, buffer).await;
    let _ = task.done.send(result);
}

async fn run(
    task: &mut IngestTask,
    ctx: &IngestContext,
    buffer: &mut Vec<u8>,
) -> Result<(), ApiError> {
    buffer.clear();
    append_metadata(
        buffer,
        &task.method,
        &task.request_uri,
        &task.http_version,
        &task.headers,
        task.include_request_line,
        task.include_headers,
    )?;

    if task.gzip {
        decode_gzip_body(&mut task.body, buffer).await?;
    } else {
        copy_body(&mut task.body, buffer).await?;
    }
    tracing::debug!(size = buffer.len(), "assembled message payload");

    let parts = resolve_receiver(&ctx.config, &task.headers)
        .map_err(|err| api_unauthorized(&err.to_string()))?;
    let topic = effective_topic(&ctx.config, &parts, task.route_topic.clone())
        .map_err(|err| api_unprocessable(&err.to_string()))?;

    if ctx.auth.enabled() {
        let subjects = ctx
            .auth
            .subjects(parts.token.as_deref())
            .map_err(|err| api_unauthorized(&err.to_string()))?;
        if !authorize_topic(&topic.fqn(), &subjects, &ctx.config.super_roles) {
            return Err(api_forbidden("token subject not allowed for tenant"));
        }
    }

    let payload = Bytes::copy_from_slice(buffer);
    ctx.producers
        .produce(
            &parts.broker_url,
            parts.token.as_deref(),
            &topic,
            payload,
            task.fire_and_forget,
        )
        .await
        .map_err(|err| api_unavailable(&err.to_string()))?;
    Ok(())
}

/// Append bytes, enforcing the worker buffer limit. Reaching the limit is
/// an overflow even when the data fit exactly: the buffer is one byte
/// larger than the largest acceptable payload.
fn append_bounded(buffer: &mut Vec<u8>, data: &[u8]) -> Result<(), ApiError> {
    let room = WORKER_BUFFER_SIZE.saturating_sub(buffer.len());
    let take = room.min(data.len());
    buffer.extend_from_slice(&data[..take]);
    if buffer.len() >= WORKER_BUFFER_SIZE || take < data.len() {
        return Err(api_internal(OVERFLOW_MESSAGE));
    }
    Ok(())
}

fn append_metadata(
    buffer: &mut Vec<u8>,
    method: &str,
    request_uri: &str,
    http_version: &str,
    headers: &HeaderMap,
    include_request_line: bool,
    include_headers: bool,
) -> Result<(), ApiError> {
    if include_request_line {
        append_bounded(buffer, method.as_bytes())?;
        append_bounded(buffer, b" ")?;
        append_bounded(buffer, request_uri.as_bytes())?;
        append_bounded(buffer, b" ")?;
        append_bounded(buffer, http_version.as_bytes())?;
        append_bounded(buffer, CRLF)?;
    }
    if include_headers {
        // First value only for multi-valued headers; enumeration order is
        // whatever the header map yields.
        for name in headers.keys() {
            let Some(value) = headers.get(name) else {
                continue;
            };
            append_bounded(buffer, name.as_str().as_bytes())?;
            append_bounded(buffer, b": ")?;
            append_bounded(buffer, value.as_bytes())?;
            append_bounded(buffer, CRLF)?;
        }
    }
    if include_request_line || include_headers {
        append_bounded(buffer, CRLF)?;
        append_bounded(buffer, CRLF)?;
    }
    Ok(())
}

async fn copy_body(
    body: &mut axum::body::BodyDataStream,
    buffer: &mut Vec<u8>,
) -> Result<(), ApiError> {
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| api_internal(&format!("read request body: {err}")))?;
        append_bounded(buffer, &chunk)?;
    }
    Ok(())
}

async fn decode_gzip_body(
    body: &mut axum::body::BodyDataStream,
    buffer: &mut Vec<u8>,
) -> Result<(), ApiError> {
    let mut decoder = GzDecoder::new(BoundedWriter { buffer });
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| api_internal(&format!("read request body: {err}")))?;
        decoder
            .write_all(&chunk)
            .map_err(|err| api_internal(&err.to_string()))?;
    }
    decoder
        .try_finish()
        .map_err(|err| api_internal(&err.to_string()))?;
    Ok(())
}

/// `Write` adapter that inflates into the worker buffer and reports
/// overflow with the same rule as `append_bounded`.
struct BoundedWriter<'a> {
    buffer: &'a mut Vec<u8>,
}

impl Write for BoundedWriter<'_> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let room = WORKER_BUFFER_SIZE.saturating_sub(self.buffer.len());
        let take = room.min(data.len());
        self.buffer.extend_from_slice(&data[..take]);
        if self.buffer.len() >= WORKER_BUFFER_SIZE {
            return Err(std::io::Error::other(OVERFLOW_MESSAGE));
        }
        Ok(take)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
