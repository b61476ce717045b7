//! Caller identity and per-tenant authorization.
//!
//! # Purpose
//! Verifies the request JWT (when auth is enabled) and decides whether its
//! subjects may touch a topic. A subject passes when it is a super-role, it
//! equals the topic tenant literally, or its last `-`-delimited suffix
//! stripped leaves the tenant name.
use anyhow::{Context, Result, bail};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::fs;

use crate::config::{AuthMode, GatewayConfig};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies bearer tokens. `Disabled` accepts everything and yields no
/// subjects, which skips authorization entirely.
pub enum TokenAuth {
    Disabled,
    Jwt {
        key: DecodingKey,
        validation: Validation,
    },
}

impl TokenAuth {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        match config.auth_mode {
            AuthMode::None => Ok(Self::Disabled),
            AuthMode::Jwt => {
                let (key, algorithm) = if let Some(path) = &config.jwt_public_key_path {
                    let pem = fs::read(path)
                        .with_context(|| format!("read BEAM_JWT_PUBLIC_KEY: {}", path.display()))?;
                    (
                        DecodingKey::from_rsa_pem(&pem).with_context(|| "parse RS256 public key")?,
                        Algorithm::RS256,
                    )
                } else if let Some(secret) = &config.jwt_hs256_secret {
                    (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
                } else {
                    bail!("auth mode jwt requires BEAM_JWT_PUBLIC_KEY or BEAM_JWT_HS256_SECRET");
                };
                let mut validation = Validation::new(algorithm);
                // Broker tokens are frequently minted without exp; expiry
                // is still enforced when the claim is present.
                validation.required_spec_claims.clear();
                Ok(Self::Jwt { key, validation })
            }
        }
    }

    pub fn enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Extract the subject list from a verified token. The subject claim
    /// may carry several comma-separated subjects.
    pub fn subjects(&self, token: Option<&str>) -> std::result::Result<String, AuthError> {
        match self {
            Self::Disabled => Ok(String::new()),
            Self::Jwt { key, validation } => {
                let token = token.ok_or(AuthError::MissingToken)?;
                let data = jsonwebtoken::decode::<Claims>(token, key, validation)
                    .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
                Ok(data.claims.sub)
            }
        }
    }
}

/// Authorize token subjects against the tenant of a topic FQN. Malformed
/// FQNs (fewer than four `/`-separated parts, or an empty tenant) deny.
pub fn authorize_topic(topic_fqn: &str, token_subjects: &str, super_roles: &[String]) -> bool {
    let parts: Vec<&str> = topic_fqn.split('/').collect();
    if parts.len() < 4 {
        return false;
    }
    let tenant = parts[2];
    if tenant.is_empty() {
        tracing::info!(tenant, subjects = token_subjects, "authorization denied");
        return false;
    }
    authorize_subject(tenant, token_subjects, super_roles)
}

/// OR across the comma-separated token subjects: super-role, literal
/// match, or tenant extracted from the subject.
pub fn authorize_subject(required: &str, token_subjects: &str, super_roles: &[String]) -> bool {
    token_subjects.split(',').any(|subject| {
        let subject = subject.trim();
        super_roles.iter().any(|role| role == subject)
            || subject == required
            || tenant_from_subject(subject).is_some_and(|tenant| tenant == required)
    })
}

/// Strip the last `-`-delimited segment of a token subject; the remainder
/// names the tenant the subject was minted for. Subjects without a `-`
/// carry no tenant.
fn tenant_from_subject(subject: &str) -> Option<&str> {
    let (tenant, _) = subject.rsplit_once('-')?;
    if tenant.is_empty() { None } else { Some(tenant) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: u64,
    }

    fn hs256_token(secret: &str, sub: &str) -> String {
        let claims = TestClaims {
            sub: sub.to_string(),
            exp: 4102444800, // far future
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode")
    }

    fn jwt_auth(secret: &str) -> TokenAuth {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        TokenAuth::Jwt {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    #[test]
    fn verifies_hs256_subject() {
        let auth = jwt_auth("sekrit");
        let token = hs256_token("sekrit", "t1-client");
        assert_eq!(auth.subjects(Some(&token)).expect("subjects"), "t1-client");
    }

    #[test]
    fn rejects_bad_signature_and_missing_token() {
        let auth = jwt_auth("sekrit");
        let token = hs256_token("other-secret", "t1-client");
        assert!(matches!(
            auth.subjects(Some(&token)),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(auth.subjects(None), Err(AuthError::MissingToken)));
    }

    #[test]
    fn disabled_auth_yields_empty_subjects() {
        assert_eq!(TokenAuth::Disabled.subjects(None).expect("ok"), "");
    }

    #[test]
    fn super_role_always_passes() {
        let roles = vec!["superuser".to_string()];
        assert!(authorize_subject("t1", "superuser", &roles));
        assert!(authorize_topic("persistent://t1/ns/top", "superuser", &roles));
    }

    #[test]
    fn literal_subject_matches_tenant() {
        assert!(authorize_subject("t1", "t1", &[]));
        assert!(!authorize_subject("t1", "t2", &[]));
    }

    #[test]
    fn suffixed_subject_matches_tenant() {
        assert!(authorize_subject("t1", "t1-client", &[]));
        assert!(authorize_subject("my-tenant", "my-tenant-admin", &[]));
        assert!(!authorize_subject("t1", "t2-client", &[]));
        // A bare `-suffix` leaves no tenant.
        assert!(!authorize_subject("t1", "-client", &[]));
    }

    #[test]
    fn any_subject_in_the_list_may_pass() {
        assert!(authorize_subject("t1", "other,t1-reader", &[]));
        assert!(!authorize_subject("t1", "other,another", &[]));
    }

    #[test]
    fn malformed_fqn_denies() {
        assert!(!authorize_topic("persistent://t1", "t1", &[]));
        assert!(!authorize_topic("persistent:///ns/top", "t1", &[]));
    }
}
