//! Produce path: long-lived producer handles, sync and fire-and-forget.
use beam_broker::{Result, TopicAddress, TopicProducer};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

use crate::pool::ConnectionPool;

/// Front-end for producing to broker topics. Producer handles are cached
/// per `(url, token, topic)` and live for the process lifetime.
pub struct ProducerGateway {
    pool: Arc<ConnectionPool>,
    producers: DashMap<(String, String, String), Arc<dyn TopicProducer>>,
}

impl ProducerGateway {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            producers: DashMap::new(),
        }
    }

    /// Deliver one payload to a topic.
    ///
    /// Sync mode waits for the broker acknowledgment. Fire-and-forget mode
    /// returns once the send is submitted; delivery failures are logged,
    /// not surfaced.
    pub async fn produce(
        &self,
        url: &str,
        token: Option<&str>,
        topic: &TopicAddress,
        payload: Bytes,
        fire_and_forget: bool,
    ) -> Result<()> {
        let producer = self.producer_for(url, token, topic).await?;
        if fire_and_forget {
            let topic_fqn = topic.fqn();
            tokio::spawn(async move {
                if let Err(err) = producer.send(payload).await {
                    tracing::warn!(topic = %topic_fqn, error = %err, "async produce failed");
                }
            });
            metrics::counter!("beam_produced_total", "mode" => "async").increment(1);
            return Ok(());
        }
        producer.send(payload).await?;
        metrics::counter!("beam_produced_total", "mode" => "sync").increment(1);
        Ok(())
    }

    async fn producer_for(
        &self,
        url: &str,
        token: Option<&str>,
        topic: &TopicAddress,
    ) -> Result<Arc<dyn TopicProducer>> {
        let key = (
            url.to_string(),
            token.unwrap_or_default().to_string(),
            topic.fqn(),
        );
        if let Some(existing) = self.producers.get(&key) {
            return Ok(existing.clone());
        }
        let conn = self.pool.get(url, token).await?;
        let producer = conn.create_producer(topic).await?;
        // A concurrent request may have raced us here; last insert wins and
        // both handles stay valid.
        self.producers.insert(key, producer.clone());
        Ok(producer)
    }
}
