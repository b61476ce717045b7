//! Consume path: per-request consumers and the short-poll batch read.
use beam_broker::subscription::NON_RESUMABLE_PREFIX;
use beam_broker::{
    BrokerConsumer, InitialPosition, Message, Result, SubscriptionOptions, SubscriptionType,
    TopicAddress,
};
use std::sync::Arc;
use std::time::Duration;

use crate::pool::ConnectionPool;

/// Front-end for consuming from broker topics. Each call to `open` yields a
/// consumer owned by the serving request.
pub struct ConsumerGateway {
    pool: Arc<ConnectionPool>,
}

impl ConsumerGateway {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Open a consumer for streaming use.
    pub async fn open(
        &self,
        url: &str,
        token: Option<&str>,
        topic: &TopicAddress,
        opts: &SubscriptionOptions,
    ) -> Result<ConsumerHandle> {
        let conn = self.pool.get(url, token).await?;
        let consumer = conn.subscribe(topic, opts).await?;
        Ok(ConsumerHandle {
            consumer,
            sub_name: opts.name.clone(),
        })
    }

    /// Drain up to `batch_size` messages, acking each one. The read always
    /// starts from the earliest retained position; short polls must not
    /// skip backlog. Returns once the batch is full or `per_msg_timeout`
    /// passes without a new message.
    pub async fn poll_batch(
        &self,
        url: &str,
        token: Option<&str>,
        topic: &TopicAddress,
        sub_name: &str,
        sub_type: SubscriptionType,
        batch_size: usize,
        per_msg_timeout: Duration,
    ) -> Result<Vec<Message>> {
        let opts = SubscriptionOptions {
            name: sub_name.to_string(),
            sub_type,
            init_pos: InitialPosition::Earliest,
        };
        let mut handle = self.open(url, token, topic, &opts).await?;
        let mut messages = Vec::new();
        while messages.len() < batch_size {
            match tokio::time::timeout(per_msg_timeout, handle.recv()).await {
                Ok(Some(msg)) => {
                    handle.ack(&msg);
                    messages.push(msg);
                }
                // Broker side closed, or nothing new within the window.
                Ok(None) | Err(_) => break,
            }
        }
        Ok(messages)
    }
}

/// A consumer owned by one request. Dropping the handle detaches the
/// broker-side consumer; non-resumable subscriptions are removed outright.
pub struct ConsumerHandle {
    consumer: BrokerConsumer,
    sub_name: String,
}

impl ConsumerHandle {
    pub async fn recv(&mut self) -> Option<Message> {
        self.consumer.recv().await
    }

    pub fn ack(&self, msg: &Message) {
        self.consumer.ack(msg);
    }

    pub fn sub_name(&self) -> &str {
        &self.sub_name
    }

    pub fn non_resumable(&self) -> bool {
        self.sub_name.starts_with(NON_RESUMABLE_PREFIX)
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        if self.non_resumable() {
            self.consumer.unsubscribe();
        }
    }
}
