use std::collections::HashMap;
use std::num::ParseIntError;

use actix_web::{http::header::HeaderValue, HttpRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::schemas::OwnerId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq)]
pub struct UserSession {
    pub user_id: OwnerId,
    pub token: String,
    /// Unix timestamp after which the token stops verifying.
    pub expires_at: i64,
}

/// What the identity provider currently knows about the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// The provider has not answered yet.
    Pending,
    SignedIn(UserSession),
    SignedOut,
}

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("malformed session token")]
    Malformed,
    #[error("session token signature mismatch")]
    BadSignature,
    #[error("session token expired")]
    Expired,
    #[error("session was signed out")]
    Revoked,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_session(&self, token: Option<&str>) -> AuthState;
    /// Ends the session behind `token`. Returns false when the token was not
    /// a live session to begin with.
    async fn sign_out(&self, token: &str) -> bool;
}

/// Verifies `user.expiry.signature` tokens minted by the identity service
/// with a shared secret.
pub struct TokenAuth {
    secret: String,
    /// Signed-out tokens and their expiry. Entries are dropped once the
    /// token would have expired anyway.
    revoked: RwLock<HashMap<String, i64>>,
}

impl TokenAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, user_id: &str, expires_at: DateTime<Utc>) -> String {
        let expiry = expires_at.timestamp();
        let signature = self
            .signer(user_id, expiry)
            .finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("{user_id}.{expiry}.{signature}")
    }

    pub async fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UserSession, AuthError> {
        let session = self.check(token, now)?;
        if self.revoked.read().await.contains_key(token) {
            return Err(AuthError::Revoked);
        }
        Ok(session)
    }

    /// Signature and expiry check, without looking at revocations.
    fn check(&self, token: &str, now: DateTime<Utc>) -> Result<UserSession, AuthError> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(expiry), Some(user_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };
        if user_id.is_empty() {
            return Err(AuthError::Malformed);
        }
        let expiry: i64 = expiry.parse().map_err(|_| AuthError::Malformed)?;
        let signature = decode_hex(signature).map_err(|_| AuthError::Malformed)?;

        self.signer(user_id, expiry)
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;
        if expiry <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(UserSession {
            user_id: user_id.to_owned(),
            token: token.to_owned(),
            expires_at: expiry,
        })
    }

    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> bool {
        let session = match self.verify(token, now).await {
            Ok(session) => session,
            Err(err) => {
                tracing::debug!(%err, "ignoring sign out");
                return false;
            }
        };
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, expires_at| *expires_at > now.timestamp());
        revoked.insert(session.token, session.expires_at);
        tracing::info!(user = %session.user_id, "signed out");
        true
    }

    fn signer(&self, user_id: &str, expiry: i64) -> HmacSha256 {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(self.secret.as_bytes());
        let secret_hash = sha256_hasher.finalize();

        // HMAC accepts keys of any length.
        let mut hmac_hasher = match HmacSha256::new_from_slice(&secret_hash) {
            Ok(hasher) => hasher,
            Err(_) => unreachable!("hmac key length is unrestricted"),
        };
        hmac_hasher.update(format!("user_id={user_id}\nexpires_at={expiry}").as_bytes());
        hmac_hasher
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, ParseIntError> {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| u8::from_str_radix(&String::from_utf8_lossy(pair), 16))
        .collect()
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn current_session(&self, token: Option<&str>) -> AuthState {
        let Some(token) = token else {
            return AuthState::SignedOut;
        };
        let session = match self.check(token, Utc::now()) {
            Ok(session) => session,
            Err(err) => {
                tracing::debug!(%err, "rejecting session token");
                return AuthState::SignedOut;
            }
        };
        // A sign out is being recorded right now; its outcome is not known yet.
        let Ok(revoked) = self.revoked.try_read() else {
            return AuthState::Pending;
        };
        if revoked.contains_key(token) {
            tracing::debug!(err = %AuthError::Revoked, "rejecting session token");
            return AuthState::SignedOut;
        }
        AuthState::SignedIn(session)
    }

    async fn sign_out(&self, token: &str) -> bool {
        self.revoke(token, Utc::now()).await
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(request: &HttpRequest) -> Option<&str> {
    request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?
        .strip_prefix("Bearer ")
}
