//! Caller authentication
//!
//! Maps an incoming request to the acting user. Two resolvers share the
//! `CallerResolver` contract: a development shim trusting the `x-user-id`
//! header, and signed session tokens carried as bearer credentials.
//! Only active users ever resolve.

use crate::config::CALLER_ID_HEADER;
use crate::database::{Repository, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait CallerResolver: Send + Sync {
    /// Identify the caller, `Ok(None)` when the request is unauthenticated
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<User>>;
}

async fn active_user(repo: &Repository, id: &str) -> Result<Option<User>> {
    Ok(repo.get::<User>(id).await?.filter(|u| u.is_active))
}

/// Trusts the caller id header as-is
pub struct HeaderCallerResolver {
    repo: Repository,
}

impl HeaderCallerResolver {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl CallerResolver for HeaderCallerResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<User>> {
        let Some(id) = headers
            .get(CALLER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        active_user(&self.repo, id).await
    }
}

/// Issues and verifies `<userId>.<expiresUnix>.<hex hmac-sha256>` tokens
pub struct SessionSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl SessionSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Generic(format!("Invalid session key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Sign a token for `user_id` valid for the configured ttl from `now`
    pub fn sign(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let expires = now.timestamp() + self.ttl.as_secs() as i64;
        let payload = format!("{}.{}", user_id, expires);
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// User id carried by a well-formed, unexpired token with a valid signature
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let (payload, signature) = token.rsplit_once('.')?;
        let (user_id, expires) = payload.rsplit_once('.')?;
        if user_id.is_empty() {
            return None;
        }

        let signature = hex::decode(signature).ok()?;
        self.mac(payload).ok()?.verify_slice(&signature).ok()?;

        let expires: i64 = expires.parse().ok()?;
        if expires <= now.timestamp() {
            tracing::debug!("Rejected expired session for {}", user_id);
            return None;
        }

        Some(user_id.to_string())
    }
}

/// Resolves `Authorization: Bearer` session tokens
pub struct SessionTokenResolver {
    repo: Repository,
    signer: std::sync::Arc<SessionSigner>,
}

impl SessionTokenResolver {
    pub fn new(repo: Repository, signer: std::sync::Arc<SessionSigner>) -> Self {
        Self { repo, signer }
    }
}

#[async_trait]
impl CallerResolver for SessionTokenResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<User>> {
        let Some(token) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
        else {
            return Ok(None);
        };

        match self.signer.verify(token, Utc::now()) {
            Some(user_id) => active_user(&self.repo, &user_id).await,
            None => Ok(None),
        }
    }
}

pub fn ensure_staff(caller: &User) -> Result<()> {
    if caller.role.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden("staff or admin role required".to_string()))
    }
}

pub fn ensure_admin(caller: &User) -> Result<()> {
    if caller.role == crate::database::Role::Admin {
        Ok(())
    } else {
        Err(AppError::Forbidden("admin role required".to_string()))
    }
}
