//! HTTP gateway for a Pulsar-style broker.
//!
//! # Purpose
//! Lets any HTTP client produce, poll, or stream messages against broker
//! topics without linking a native broker client. The data plane is three
//! endpoints: firehose ingestion (POST), short-poll batch reads (GET), and
//! a server-sent-event stream (GET).
//!
//! # How it fits
//! Route handlers resolve credentials, broker URL, and the target topic
//! from headers and path variables, then hand off to the pooled gateways
//! in `beam-client`. Ingestion runs on a fixed worker pool whose workers
//! own pre-allocated buffers; the pool doubles as the admission control.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod observability;
pub mod resolve;
pub mod workerpool;
