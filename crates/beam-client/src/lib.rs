//! Pooled broker clients and the produce/consume gateways.
//!
//! # Purpose
//! Owns the `(url, token)` connection cache and the two request-facing
//! gateways: `ProducerGateway` (long-lived producer handles, sync and
//! fire-and-forget sends) and `ConsumerGateway` (per-request consumers and
//! the short-poll batch read).
//!
//! # Key invariants
//! - Connections and producers are cached and reused; a fresh client per
//!   request is never created.
//! - Consumer handles release their broker-side consumer on drop, and
//!   remove the subscription when its name carries the non-resumable
//!   prefix.
mod consumer;
mod pool;
mod producer;

pub use consumer::{ConsumerGateway, ConsumerHandle};
pub use pool::ConnectionPool;
pub use producer::ProducerGateway;
