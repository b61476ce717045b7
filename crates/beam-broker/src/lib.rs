//! Broker-facing API shared by the HTTP gateway and broker drivers.
//!
//! # Purpose
//! Defines the topic/subscription model and the producer/consumer traits the
//! gateway compiles against, plus an in-process broker implementation used
//! for local mode and tests.
//!
//! # How it fits
//! `beam-client` pools connections and exposes the produce/consume gateways;
//! this crate owns the seam those gateways talk through. A network driver
//! implements the same traits against a remote cluster.
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod inprocess;
pub mod subscription;
pub mod topic;

pub use subscription::{InitialPosition, SubscriptionOptions, SubscriptionType};
pub use topic::{Persistence, TopicAddress};

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("broker rejected credentials: {0}")]
    AuthFailed(String),
    #[error("subscription {0} already has an active consumer")]
    SubscriptionBusy(String),
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    #[error("invalid subscription name: {0}")]
    InvalidSubscription(String),
}

/// A message as delivered by a consumer. The id is the broker's stringified
/// message identifier and is treated as opaque by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub payload: Bytes,
}

/// One connection to a broker cluster, scoped to a `(url, token)` pair.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_producer(&self, topic: &TopicAddress) -> Result<Arc<dyn TopicProducer>>;
    async fn subscribe(
        &self,
        topic: &TopicAddress,
        opts: &SubscriptionOptions,
    ) -> Result<BrokerConsumer>;
}

/// Producer handle bound to a single topic. Handles are cheap to clone via
/// `Arc` and are expected to be cached by the caller.
#[async_trait]
pub trait TopicProducer: Send + Sync {
    /// Deliver one payload and wait for the broker acknowledgment. Returns
    /// the assigned message id.
    async fn send(&self, payload: Bytes) -> Result<String>;
}

/// Consumer-side control surface. All operations are synchronous state
/// transitions so they can run from `Drop`.
pub trait ConsumerControl: Send + Sync {
    /// Acknowledge one delivered message.
    fn ack(&self, msg: &Message);
    /// Remove the subscription from the broker entirely.
    fn unsubscribe(&self);
    /// Detach this consumer, leaving the subscription (and any durable
    /// state) behind.
    fn detach(&self);
}

/// A live consumer: a bounded receive channel plus its control handle.
///
/// Dropping the consumer detaches it from the broker; the subscription
/// itself is left intact unless `unsubscribe` was called.
pub struct BrokerConsumer {
    rx: mpsc::Receiver<Message>,
    control: Arc<dyn ConsumerControl>,
    unsubscribed: bool,
}

impl BrokerConsumer {
    pub fn new(rx: mpsc::Receiver<Message>, control: Arc<dyn ConsumerControl>) -> Self {
        Self {
            rx,
            control,
            unsubscribed: false,
        }
    }

    /// Receive the next message. `None` means the broker side closed the
    /// channel.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn ack(&self, msg: &Message) {
        self.control.ack(msg);
    }

    /// Remove the subscription from the broker. Implies detach.
    pub fn unsubscribe(&mut self) {
        self.control.unsubscribe();
        self.unsubscribed = true;
    }
}

impl Drop for BrokerConsumer {
    fn drop(&mut self) {
        if !self.unsubscribed {
            self.control.detach();
        }
    }
}

/// Produces connections for `(url, token)` pairs. The pool in `beam-client`
/// owns caching and eviction; factories only know how to dial.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, url: &str, token: Option<&str>) -> Result<Arc<dyn BrokerConnection>>;
}
