use anyhow::{Context, Result, bail};
use beam_broker::Persistence;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

// Gateway configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // HTTP bind address for the data-plane API.
    pub bind_addr: SocketAddr,
    // Metrics HTTP bind address.
    pub metrics_bind: SocketAddr,
    // Broker URL used when the request does not name one.
    pub default_broker_url: String,
    // Broker URLs a request may name explicitly. The default URL is always
    // acceptable.
    pub allowed_broker_urls: Vec<String>,
    // Subjects that bypass per-tenant authorization.
    pub super_roles: Vec<String>,
    // Persistence modes requests may address.
    pub persistence_modes: Vec<Persistence>,
    // Worker count and queue capacity for the ingestion pool.
    pub worker_pool_size: usize,
    // Header carrying the broker token. Empty disables token forwarding.
    pub token_header: String,
    // Whether data-plane requests must carry a verifiable JWT.
    pub auth_mode: AuthMode,
    // RS256 public key (PEM) for JWT verification.
    pub jwt_public_key_path: Option<PathBuf>,
    // HS256 shared secret, the dev/test alternative to the public key.
    pub jwt_hs256_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Jwt,
}

impl AuthMode {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(Self::None),
            "jwt" => Ok(Self::Jwt),
            other => bail!("unknown auth mode {other} (expected none or jwt)"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    default_broker_url: Option<String>,
    allowed_broker_urls: Option<Vec<String>>,
    super_roles: Option<Vec<String>>,
    persistence_modes: Option<Vec<String>>,
    worker_pool_size: Option<usize>,
    token_header: Option<String>,
    auth_mode: Option<String>,
    jwt_public_key_path: Option<PathBuf>,
    jwt_hs256_secret: Option<String>,
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn persistence_modes(tokens: &[String]) -> Result<Vec<Persistence>> {
    let mut modes = Vec::new();
    for token in tokens {
        let mode = Persistence::from_token(token)
            .with_context(|| format!("unknown persistence mode {token}"))?;
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    if modes.is_empty() {
        bail!("at least one persistence mode must be enabled");
    }
    Ok(modes)
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        // Environment variables provide defaults for local development.
        let bind_addr = std::env::var("BEAM_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8085".to_string())
            .parse()
            .with_context(|| "parse BEAM_BIND")?;
        let metrics_bind = std::env::var("BEAM_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8090".to_string())
            .parse()
            .with_context(|| "parse BEAM_METRICS_BIND")?;
        let default_broker_url = std::env::var("BEAM_BROKER_URL")
            .unwrap_or_else(|_| "pulsar://localhost:6650".to_string());
        let allowed_broker_urls = std::env::var("BEAM_ALLOWED_BROKER_URLS")
            .map(|v| comma_list(&v))
            .unwrap_or_default();
        let super_roles = std::env::var("BEAM_SUPER_ROLES")
            .map(|v| comma_list(&v))
            .unwrap_or_default();
        let persistence_modes = persistence_modes(&comma_list(
            &std::env::var("BEAM_PERSISTENCE_MODES")
                .unwrap_or_else(|_| "persistent,nonpersistent".to_string()),
        ))?;
        let worker_pool_size = std::env::var("BEAM_WORKER_POOL_SIZE")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .with_context(|| "parse BEAM_WORKER_POOL_SIZE")?;
        if worker_pool_size == 0 {
            bail!("BEAM_WORKER_POOL_SIZE must be at least 1");
        }
        // Token header defaults to Authorization; setting the variable to
        // an empty string disables token forwarding entirely.
        let token_header =
            std::env::var("BEAM_TOKEN_HEADER").unwrap_or_else(|_| "Authorization".to_string());
        let auth_mode = AuthMode::parse(
            &std::env::var("BEAM_AUTH_MODE").unwrap_or_else(|_| "none".to_string()),
        )?;
        let jwt_public_key_path = std::env::var("BEAM_JWT_PUBLIC_KEY").ok().map(PathBuf::from);
        let jwt_hs256_secret = std::env::var("BEAM_JWT_HS256_SECRET").ok();
        Ok(Self {
            bind_addr,
            metrics_bind,
            default_broker_url,
            allowed_broker_urls,
            super_roles,
            persistence_modes,
            worker_pool_size,
            token_header,
            auth_mode,
            jwt_public_key_path,
            jwt_hs256_secret,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("BEAM_CONFIG") {
            // YAML overrides allow ops-friendly config files.
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read BEAM_CONFIG: {path}"))?;
            let override_cfg: GatewayConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse gateway config yaml")?;
            if let Some(value) = override_cfg.bind_addr {
                config.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(value) = override_cfg.default_broker_url {
                config.default_broker_url = value;
            }
            if let Some(value) = override_cfg.allowed_broker_urls {
                config.allowed_broker_urls = value;
            }
            if let Some(value) = override_cfg.super_roles {
                config.super_roles = value;
            }
            if let Some(value) = override_cfg.persistence_modes {
                config.persistence_modes = persistence_modes(&value)?;
            }
            if let Some(value) = override_cfg.worker_pool_size {
                if value == 0 {
                    bail!("worker_pool_size must be at least 1");
                }
                config.worker_pool_size = value;
            }
            if let Some(value) = override_cfg.token_header {
                config.token_header = value;
            }
            if let Some(value) = override_cfg.auth_mode {
                config.auth_mode = AuthMode::parse(&value)?;
            }
            if let Some(value) = override_cfg.jwt_public_key_path {
                config.jwt_public_key_path = Some(value);
            }
            if let Some(value) = override_cfg.jwt_hs256_secret {
                config.jwt_hs256_secret = Some(value);
            }
        }
        Ok(config)
    }

    /// Whether a request may name this broker URL.
    pub fn url_allowed(&self, url: &str) -> bool {
        url == self.default_broker_url || self.allowed_broker_urls.iter().any(|u| u == url)
    }
}
