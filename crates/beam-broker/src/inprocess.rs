//! In-process broker.
//!
//! # Purpose
//! A tokio-based broker that backs local mode and tests: per-topic bounded
//! replay log for earliest-position subscriptions, per-subscription pending
//! queues, and bounded per-consumer channels fanned out with `try_send`.
//!
//! # Key invariants
//! - Delivery is strictly FIFO per subscription: every message passes
//!   through the pending queue before it reaches a consumer channel.
//! - Subscription state survives consumer detach; only `unsubscribe`
//!   removes it.
//! - A full consumer channel keeps messages pending; a full pending queue
//!   drops the oldest entry and counts the drop.
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::subscription::{InitialPosition, SubscriptionOptions, SubscriptionType};
use crate::topic::TopicAddress;
use crate::{
    BrokerConnection, BrokerConsumer, BrokerError, ConnectionFactory, ConsumerControl, Message,
    Result, TopicProducer,
};

const LOG_CAPACITY: usize = 1024;
const PENDING_CAPACITY: usize = 1024;
const CONSUMER_QUEUE_DEPTH: usize = 1024;

#[derive(Default)]
struct TopicState {
    log: VecDeque<Message>,
    next_seq: u64,
    subscriptions: HashMap<String, SubscriptionState>,
}

struct SubscriptionState {
    sub_type: SubscriptionType,
    consumers: Vec<ConsumerSlot>,
    rr_next: usize,
    pending: VecDeque<Message>,
    acked: u64,
}

struct ConsumerSlot {
    id: u64,
    tx: mpsc::Sender<Message>,
}

impl SubscriptionState {
    fn new(sub_type: SubscriptionType) -> Self {
        Self {
            sub_type,
            consumers: Vec::new(),
            rr_next: 0,
            pending: VecDeque::new(),
            acked: 0,
        }
    }

    fn enqueue(&mut self, msg: Message) {
        if self.pending.len() >= PENDING_CAPACITY {
            self.pending.pop_front();
            metrics::counter!("beam_broker_dropped_total").increment(1);
        }
        self.pending.push_back(msg);
    }

    /// Move pending messages into consumer channels until a channel is full
    /// or the queue is empty. Closed consumers are pruned first so delivery
    /// never targets a receiver that went away.
    fn pump(&mut self) {
        self.consumers.retain(|slot| !slot.tx.is_closed());
        if self.consumers.is_empty() {
            return;
        }
        while let Some(msg) = self.pending.front() {
            let target = match self.sub_type {
                // Exclusive and failover deliver to the single active
                // consumer; the first attached one is active.
                SubscriptionType::Exclusive | SubscriptionType::Failover => 0,
                SubscriptionType::Shared => self.rr_next % self.consumers.len(),
            };
            match self.consumers[target].tx.try_send(msg.clone()) {
                Ok(()) => {
                    self.pending.pop_front();
                    if self.sub_type == SubscriptionType::Shared {
                        self.rr_next = self.rr_next.wrapping_add(1);
                    }
                }
                Err(_) => break,
            }
        }
    }
}

struct BrokerInner {
    topics: Mutex<HashMap<String, TopicState>>,
    next_consumer_id: Mutex<u64>,
}

/// An in-memory broker instance. One instance stands in for one cluster
/// URL; all connections against the same URL share it.
#[derive(Clone)]
pub struct InProcessBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: Mutex::new(HashMap::new()),
                next_consumer_id: Mutex::new(0),
            }),
        }
    }

    /// Append one message to a topic and fan it out to subscriptions.
    /// Returns the assigned message id.
    pub fn publish(&self, topic_fqn: &str, payload: Bytes) -> String {
        let mut topics = self.inner.topics.lock().expect("topics lock");
        let topic = topics.entry(topic_fqn.to_string()).or_default();
        let id = format!("{}:0:-1", topic.next_seq);
        topic.next_seq += 1;
        let msg = Message {
            id,
            payload,
        };
        if topic.log.len() >= LOG_CAPACITY {
            topic.log.pop_front();
        }
        topic.log.push_back(msg.clone());
        for sub in topic.subscriptions.values_mut() {
            sub.enqueue(msg.clone());
            sub.pump();
        }
        msg.id
    }

    /// Names of the subscriptions currently held for a topic. Exposed for
    /// operational introspection.
    pub fn subscription_names(&self, topic_fqn: &str) -> Vec<String> {
        let topics = self.inner.topics.lock().expect("topics lock");
        topics
            .get(topic_fqn)
            .map(|t| t.subscriptions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of acknowledged messages on a subscription.
    pub fn acked_count(&self, topic_fqn: &str, sub_name: &str) -> u64 {
        let topics = self.inner.topics.lock().expect("topics lock");
        topics
            .get(topic_fqn)
            .and_then(|t| t.subscriptions.get(sub_name))
            .map(|s| s.acked)
            .unwrap_or(0)
    }
}

#[async_trait]
impl BrokerConnection for InProcessBroker {
    async fn create_producer(&self, topic: &TopicAddress) -> Result<Arc<dyn TopicProducer>> {
        Ok(Arc::new(InProcessProducer {
            broker: self.clone(),
            topic_fqn: topic.fqn(),
        }))
    }

    async fn subscribe(
        &self,
        topic: &TopicAddress,
        opts: &SubscriptionOptions,
    ) -> Result<BrokerConsumer> {
        let consumer_id = {
            let mut next = self.inner.next_consumer_id.lock().expect("id lock");
            *next += 1;
            *next
        };
        let topic_fqn = topic.fqn();
        let (tx, rx) = mpsc::channel(CONSUMER_QUEUE_DEPTH);
        {
            let mut topics = self.inner.topics.lock().expect("topics lock");
            let topic = topics.entry(topic_fqn.clone()).or_default();
            if !topic.subscriptions.contains_key(&opts.name) {
                let mut fresh = SubscriptionState::new(opts.sub_type);
                if opts.init_pos == InitialPosition::Earliest {
                    fresh.pending = topic.log.iter().cloned().collect();
                }
                topic.subscriptions.insert(opts.name.clone(), fresh);
            }
            let sub = topic
                .subscriptions
                .get_mut(&opts.name)
                .expect("subscription present");
            sub.consumers.retain(|slot| !slot.tx.is_closed());
            let exclusive = matches!(
                sub.sub_type,
                SubscriptionType::Exclusive | SubscriptionType::Failover
            );
            if exclusive && !sub.consumers.is_empty() {
                return Err(BrokerError::SubscriptionBusy(opts.name.clone()));
            }
            sub.consumers.push(ConsumerSlot {
                id: consumer_id,
                tx,
            });
            sub.pump();
        }
        let control = Arc::new(InProcessControl {
            inner: self.inner.clone(),
            topic_fqn,
            sub_name: opts.name.clone(),
            consumer_id,
        });
        Ok(BrokerConsumer::new(rx, control))
    }
}

struct InProcessProducer {
    broker: InProcessBroker,
    topic_fqn: String,
}

#[async_trait]
impl TopicProducer for InProcessProducer {
    async fn send(&self, payload: Bytes) -> Result<String> {
        Ok(self.broker.publish(&self.topic_fqn, payload))
    }
}

struct InProcessControl {
    inner: Arc<BrokerInner>,
    topic_fqn: String,
    sub_name: String,
    consumer_id: u64,
}

impl ConsumerControl for InProcessControl {
    fn ack(&self, _msg: &Message) {
        let mut topics = self.inner.topics.lock().expect("topics lock");
        if let Some(sub) = topics
            .get_mut(&self.topic_fqn)
            .and_then(|t| t.subscriptions.get_mut(&self.sub_name))
        {
            sub.acked += 1;
        }
    }

    fn unsubscribe(&self) {
        let mut topics = self.inner.topics.lock().expect("topics lock");
        if let Some(topic) = topics.get_mut(&self.topic_fqn) {
            topic.subscriptions.remove(&self.sub_name);
        }
    }

    fn detach(&self) {
        let mut topics = self.inner.topics.lock().expect("topics lock");
        if let Some(sub) = topics
            .get_mut(&self.topic_fqn)
            .and_then(|t| t.subscriptions.get_mut(&self.sub_name))
        {
            sub.consumers.retain(|slot| slot.id != self.consumer_id);
            // Remaining pending messages are picked up by the next attach.
        }
    }
}

/// Factory that maps each broker URL to one shared in-process instance.
/// Tokens are accepted but not checked; credential enforcement belongs to
/// real drivers.
#[derive(Default)]
pub struct InProcessFactory {
    brokers: DashMap<String, InProcessBroker>,
}

impl InProcessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The broker instance behind a URL, creating it on first use.
    pub fn broker(&self, url: &str) -> InProcessBroker {
        self.brokers
            .entry(url.to_string())
            .or_insert_with(InProcessBroker::new)
            .clone()
    }
}

#[async_trait]
impl ConnectionFactory for InProcessFactory {
    async fn connect(&self, url: &str, _token: Option<&str>) -> Result<Arc<dyn BrokerConnection>> {
        Ok(Arc::new(self.broker(url)))
    }
}
