//! Topic naming.
//!
//! A fully qualified topic name has the shape
//! `persistent://tenant/namespace/topic` (or `non-persistent://…`). Route
//! handlers accept the short persistence tokens `p`/`np` as well as the full
//! words.
use serde::{Deserialize, Serialize};

use crate::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persistence {
    Persistent,
    NonPersistent,
}

impl Persistence {
    /// Map a route token to a persistence mode.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "p" | "persistent" => Some(Self::Persistent),
            "np" | "nonpersistent" => Some(Self::NonPersistent),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::NonPersistent => "non-persistent",
        }
    }
}

/// A broker topic address. All four components are non-empty by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicAddress {
    persistence: Persistence,
    tenant: String,
    namespace: String,
    topic: String,
}

impl TopicAddress {
    /// Build an address from route components, validating the persistence
    /// token and rejecting empty parts.
    pub fn from_parts(
        persistence: &str,
        tenant: &str,
        namespace: &str,
        topic: &str,
    ) -> Result<Self, BrokerError> {
        let persistence = Persistence::from_token(persistence).ok_or_else(|| {
            BrokerError::InvalidTopic(format!("unknown persistence token {persistence}"))
        })?;
        if tenant.is_empty() || namespace.is_empty() || topic.is_empty() {
            return Err(BrokerError::InvalidTopic(
                "tenant, namespace and topic must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            persistence,
            tenant: tenant.to_string(),
            namespace: namespace.to_string(),
            topic: topic.to_string(),
        })
    }

    /// Parse a fully qualified name, e.g. `persistent://t/ns/topic`.
    pub fn parse(fqn: &str) -> Result<Self, BrokerError> {
        let (scheme, rest) = fqn
            .split_once("://")
            .ok_or_else(|| BrokerError::InvalidTopic(format!("missing scheme in {fqn}")))?;
        let persistence = match scheme {
            "persistent" => Persistence::Persistent,
            "non-persistent" => Persistence::NonPersistent,
            other => {
                return Err(BrokerError::InvalidTopic(format!("unknown scheme {other}")));
            }
        };
        let mut parts = rest.splitn(3, '/');
        let tenant = parts.next().unwrap_or_default();
        let namespace = parts.next().unwrap_or_default();
        let topic = parts.next().unwrap_or_default();
        if tenant.is_empty() || namespace.is_empty() || topic.is_empty() || topic.contains('/') {
            return Err(BrokerError::InvalidTopic(format!(
                "expected scheme://tenant/namespace/topic, got {fqn}"
            )));
        }
        Ok(Self {
            persistence,
            tenant: tenant.to_string(),
            namespace: namespace.to_string(),
            topic: topic.to_string(),
        })
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The canonical fully qualified name.
    pub fn fqn(&self) -> String {
        format!(
            "{}://{}/{}/{}",
            self.persistence.scheme(),
            self.tenant,
            self.namespace,
            self.topic
        )
    }
}

impl std::fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fqn())
    }
}
