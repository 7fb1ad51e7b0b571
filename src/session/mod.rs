//! Session Module
//!
//! Supplies the bearer token for authenticated requests. The token is looked
//! up on every call; there is no refresh or rotation.

pub mod storage;

pub use storage::SessionStore;

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::types::{AppError, AppResult};

/// Where the bearer token comes from
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// The current token, or `None` when signed out
    async fn bearer_token(&self) -> AppResult<Option<String>>;
}

/// Fixed token, used for the `PAYPORTAL_TOKEN` override
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self(Some(token).filter(|t| !t.trim().is_empty()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> AppResult<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Build the token source for this process: the environment override if set,
/// otherwise the on-disk session store.
pub fn token_source(config: &SessionConfig) -> Arc<dyn TokenSource> {
    match &config.token_override {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(SessionStore::new(&config.data_dir)),
    }
}

/// Resolve a token or fail with [`AppError::MissingAuth`]
pub async fn require_token(source: &dyn TokenSource) -> AppResult<String> {
    source.bearer_token().await?.ok_or(AppError::MissingAuth)
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// True only for JWT-shaped tokens whose `exp` claim is in the past.
/// Opaque tokens are left for the backend to judge.
pub(crate) fn is_expired(token: &str) -> bool {
    if token.split('.').count() != 3 {
        return false;
    }

    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => match data.claims.exp {
            Some(exp) => exp <= chrono::Utc::now().timestamp(),
            None => false,
        },
        Err(_) => false,
    }
}
