//! Request → broker binding.
//!
//! # Purpose
//! Extracts the broker token, broker URL, and target topic from headers and
//! route variables, and the subscription parameters from the query string.
//! The `PulsarUrl` header is checked against the operator allow-list; the
//! `TopicFn` header overrides the route-derived topic.
use axum::http::HeaderMap;
use beam_broker::{InitialPosition, SubscriptionOptions, SubscriptionType, TopicAddress};
use serde::Deserialize;

use crate::config::GatewayConfig;

pub const PULSAR_URL_HEADER: &str = "PulsarUrl";
pub const TOPIC_FN_HEADER: &str = "TopicFn";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(thiserror::Error, Debug, Clone)]
pub enum ResolveError {
    #[error("broker url {0} is not in the allowed list")]
    UnauthorizedUrl(String),
    #[error("header value is not valid ascii")]
    BadHeader,
    #[error("missing topic parts in route")]
    BadRoute,
    #[error("{0}")]
    BadTopic(String),
    #[error("{0}")]
    BadSubscription(String),
}

/// Credentials and overrides carried by request headers.
#[derive(Debug, Clone)]
pub struct ReceiverParts {
    pub token: Option<String>,
    pub topic_override: Option<String>,
    pub broker_url: String,
}

/// Everything a consume endpoint needs: credentials, topic, subscription.
#[derive(Debug)]
pub struct ConsumerConfig {
    pub token: Option<String>,
    pub broker_url: String,
    pub topic: TopicAddress,
    pub options: SubscriptionOptions,
}

/// Query parameters accepted by the consume endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ConsumeQuery {
    #[serde(rename = "SubscriptionName", default)]
    pub subscription_name: String,
    #[serde(rename = "SubscriptionType")]
    pub subscription_type: Option<String>,
    #[serde(rename = "SubscriptionInitialPosition")]
    pub initial_position: Option<String>,
    #[serde(rename = "batchSize")]
    pub batch_size: Option<usize>,
    #[serde(rename = "perMessageTimeoutMs")]
    pub per_message_timeout_ms: Option<u64>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ResolveError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ResolveError::BadHeader),
        None => Ok(None),
    }
}

/// Resolve token, topic override, and broker URL from headers.
pub fn resolve_receiver(
    config: &GatewayConfig,
    headers: &HeaderMap,
) -> Result<ReceiverParts, ResolveError> {
    let token = if config.token_header.is_empty() {
        None
    } else {
        header_str(headers, &config.token_header)?
            .map(|raw| raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw).trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };

    let topic_override = header_str(headers, TOPIC_FN_HEADER)?
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let broker_url = match header_str(headers, PULSAR_URL_HEADER)?.filter(|u| !u.is_empty()) {
        Some(url) if config.url_allowed(url) => url.to_string(),
        Some(url) => return Err(ResolveError::UnauthorizedUrl(url.to_string())),
        None => config.default_broker_url.clone(),
    };

    Ok(ReceiverParts {
        token,
        topic_override,
        broker_url,
    })
}

/// Build the topic address from the four route variables.
pub fn topic_from_route(
    persistent: &str,
    tenant: &str,
    namespace: &str,
    topic: &str,
) -> Result<TopicAddress, ResolveError> {
    if persistent.is_empty() || tenant.is_empty() || namespace.is_empty() || topic.is_empty() {
        return Err(ResolveError::BadRoute);
    }
    TopicAddress::from_parts(persistent, tenant, namespace, topic)
        .map_err(|err| ResolveError::BadTopic(err.to_string()))
}

/// Apply the topic precedence: a non-empty `TopicFn` header wins over the
/// route; otherwise the route must have resolved. The result must use an
/// enabled persistence mode.
pub fn effective_topic(
    config: &GatewayConfig,
    parts: &ReceiverParts,
    route_topic: Result<TopicAddress, ResolveError>,
) -> Result<TopicAddress, ResolveError> {
    let topic = match &parts.topic_override {
        Some(fqn) => {
            TopicAddress::parse(fqn).map_err(|err| ResolveError::BadTopic(err.to_string()))?
        }
        None => route_topic?,
    };
    if !config.persistence_modes.contains(&topic.persistence()) {
        return Err(ResolveError::BadTopic(format!(
            "{} topics are not enabled",
            topic.persistence().scheme()
        )));
    }
    Ok(topic)
}

/// Subscription parameters with the documented defaults.
pub fn subscription_options(query: &ConsumeQuery) -> Result<SubscriptionOptions, ResolveError> {
    let sub_type = match &query.subscription_type {
        Some(raw) => SubscriptionType::parse(raw)
            .map_err(|err| ResolveError::BadSubscription(err.to_string()))?,
        None => SubscriptionType::Exclusive,
    };
    let init_pos = match &query.initial_position {
        Some(raw) => InitialPosition::parse(raw)
            .map_err(|err| ResolveError::BadSubscription(err.to_string()))?,
        None => InitialPosition::Latest,
    };
    SubscriptionOptions::new(&query.subscription_name, sub_type, init_pos)
        .map_err(|err| ResolveError::BadSubscription(err.to_string()))
}

/// Combined resolution for the consume endpoints.
pub fn consumer_config(
    config: &GatewayConfig,
    headers: &HeaderMap,
    route: (&str, &str, &str, &str),
    query: &ConsumeQuery,
) -> Result<ConsumerConfig, ResolveError> {
    let parts = resolve_receiver(config, headers)?;
    let route_topic = topic_from_route(route.0, route.1, route.2, route.3);
    let topic = effective_topic(config, &parts, route_topic)?;
    let options = subscription_options(query)?;
    Ok(ConsumerConfig {
        token: parts.token,
        broker_url: parts.broker_url,
        topic,
        options,
    })
}
