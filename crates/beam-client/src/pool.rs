//! Connection cache keyed by `(url, token)`.
use beam_broker::{BrokerConnection, ConnectionFactory, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Connections idle longer than this are dialed again on next use.
const IDLE_TTL: Duration = Duration::from_secs(15 * 60);

struct PooledConnection {
    conn: Arc<dyn BrokerConnection>,
    last_used: Instant,
}

/// Shared cache of broker connections. Handing out `Arc`s keeps a
/// connection alive for as long as any request still holds it, even if the
/// pool evicts its entry in the meantime.
pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    connections: DashMap<(String, String), PooledConnection>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            factory,
            connections: DashMap::new(),
        }
    }

    /// Fetch or dial the connection for a `(url, token)` pair.
    pub async fn get(&self, url: &str, token: Option<&str>) -> Result<Arc<dyn BrokerConnection>> {
        self.evict_idle();
        let key = (url.to_string(), token.unwrap_or_default().to_string());
        if let Some(mut entry) = self.connections.get_mut(&key) {
            entry.last_used = Instant::now();
            return Ok(entry.conn.clone());
        }
        let conn = self.factory.connect(url, token).await?;
        self.connections.insert(
            key,
            PooledConnection {
                conn: conn.clone(),
                last_used: Instant::now(),
            },
        );
        metrics::gauge!("beam_broker_connections").set(self.connections.len() as f64);
        Ok(conn)
    }

    fn evict_idle(&self) {
        let now = Instant::now();
        self.connections
            .retain(|_, entry| now.duration_since(entry.last_used) < IDLE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_broker::inprocess::InProcessFactory;

    #[tokio::test]
    async fn reuses_connection_for_same_key() {
        let pool = ConnectionPool::new(Arc::new(InProcessFactory::new()));
        let a = pool.get("pulsar://x:6650", Some("tok")).await.expect("a");
        let b = pool.get("pulsar://x:6650", Some("tok")).await.expect("b");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn distinct_tokens_get_distinct_connections() {
        let pool = ConnectionPool::new(Arc::new(InProcessFactory::new()));
        let a = pool.get("pulsar://x:6650", Some("alice")).await.expect("a");
        let b = pool.get("pulsar://x:6650", Some("bob")).await.expect("b");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
