//! Data-plane HTTP handlers.
//!
//! # Purpose
//! Exposes the three endpoint modules (firehose ingestion, short-poll,
//! SSE streaming) plus the liveness probe and shared error shaping.
pub mod error;
pub mod firehose;
pub mod poll;
pub mod sse;
pub mod status;
