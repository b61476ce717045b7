//! Subscription parameters and the auto-generated name policy.
use uuid::Uuid;

use crate::BrokerError;

/// Prefix marking subscriptions that were auto-named for a single stream or
/// poll. These are the only subscriptions that may be removed when the
/// serving request ends; every other name is durable broker state.
pub const NON_RESUMABLE_PREFIX: &str = "non-resumable-";

/// Explicit names shorter than this are rejected.
const MIN_NAME_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionType {
    #[default]
    Exclusive,
    Shared,
    Failover,
}

impl SubscriptionType {
    pub fn parse(value: &str) -> Result<Self, BrokerError> {
        match value.to_ascii_lowercase().as_str() {
            "exclusive" => Ok(Self::Exclusive),
            "shared" => Ok(Self::Shared),
            "failover" => Ok(Self::Failover),
            other => Err(BrokerError::InvalidSubscription(format!(
                "unsupported subscription type {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialPosition {
    #[default]
    Latest,
    Earliest,
}

impl InitialPosition {
    pub fn parse(value: &str) -> Result<Self, BrokerError> {
        match value.to_ascii_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "earliest" => Ok(Self::Earliest),
            other => Err(BrokerError::InvalidSubscription(format!(
                "unsupported initial position {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub name: String,
    pub sub_type: SubscriptionType,
    pub init_pos: InitialPosition,
}

impl SubscriptionOptions {
    pub fn new(
        name: &str,
        sub_type: SubscriptionType,
        init_pos: InitialPosition,
    ) -> Result<Self, BrokerError> {
        Ok(Self {
            name: subscription_name(name)?,
            sub_type,
            init_pos,
        })
    }

    /// Whether this subscription may be removed when its consumer goes away.
    pub fn non_resumable(&self) -> bool {
        self.name.starts_with(NON_RESUMABLE_PREFIX)
    }
}

/// Apply the name policy: empty names get a generated non-resumable name,
/// explicit names must be at least five characters.
pub fn subscription_name(name: &str) -> Result<String, BrokerError> {
    if name.is_empty() {
        return Ok(format!("{NON_RESUMABLE_PREFIX}{}", Uuid::new_v4()));
    }
    if name.len() < MIN_NAME_LEN {
        return Err(BrokerError::InvalidSubscription(
            "subscription name must be more than 4 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
