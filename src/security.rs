// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Security.
//!
//! Password hashing and the signed tokens handed out by the service: session
//! access tokens, single-purpose links sent by mail, and label download tokens.
//!

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::model::user::{Role, User};
use crate::settings::CargoveraSettings;

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

pub fn hash_password(password: &str) -> Result<String, Error> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| Error::Internal(format!("Hash error: {}", e)))
}

/// Check a password against its hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// [`hash_password`] on the blocking thread pool.
pub async fn spawn_hash_password(password: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| Error::Internal(format!("Hash task failed: {}", e)))?
}

/// [`verify_password`] on the blocking thread pool.
pub async fn spawn_verify_password(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Claims of a session access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

/// What a mailed link may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Purpose {
    #[serde(rename = "email-confirm")]
    EmailConfirm,
    #[serde(rename = "password-reset")]
    PasswordReset,
    #[serde(rename = "label-download")]
    LabelDownload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PurposeClaims {
    sub: String,
    purpose: Purpose,
    exp: i64,
    iat: i64,
}

/// Issues and checks HS256 tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    link_ttl: Duration,
    download_ttl: Duration,
}

impl TokenService {
    pub fn new(settings: &CargoveraSettings) -> Self {
        let secret = settings.auth.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: Duration::minutes(settings.auth.token_ttl_mins),
            link_ttl: Duration::seconds(settings.auth.link_ttl_secs),
            download_ttl: Duration::seconds(settings.labels.url_ttl_secs),
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_owned());
        validation
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Token error: {}", e)))
    }

    pub fn access_token(&self, user: &User) -> Result<String, Error> {
        let now = Utc::now();
        self.sign(&AccessClaims {
            user_id: user.id,
            name: user.name.clone(),
            role: user.role(),
            email: user.email.clone(),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
        })
    }

    /// Decode an access token.
    ///
    /// # Errors
    ///
    /// * `Error::Unauthorized` - bad signature, malformed or expired
    ///
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, Error> {
        decode::<AccessClaims>(token, &self.decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(|_| Error::Unauthorized("Invalid token".to_owned()))
    }

    fn purpose_token(&self, subject: &str, purpose: Purpose, ttl: Duration) -> Result<String, Error> {
        let now = Utc::now();
        self.sign(&PurposeClaims {
            sub: subject.to_owned(),
            purpose,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        })
    }

    /// Subject of a single-purpose token, `None` when the token is invalid,
    /// expired or issued for another purpose.
    fn verify_purpose(&self, token: &str, purpose: Purpose) -> Option<String> {
        let claims = decode::<PurposeClaims>(token, &self.decoding, &Self::validation())
            .ok()?
            .claims;
        (claims.purpose == purpose).then_some(claims.sub)
    }

    pub fn email_token(&self, email: &str) -> Result<String, Error> {
        self.purpose_token(email, Purpose::EmailConfirm, self.link_ttl)
    }

    pub fn verify_email_token(&self, token: &str) -> Option<String> {
        self.verify_purpose(token, Purpose::EmailConfirm)
    }

    pub fn reset_token(&self, email: &str) -> Result<String, Error> {
        self.purpose_token(email, Purpose::PasswordReset, self.link_ttl)
    }

    pub fn verify_reset_token(&self, token: &str) -> Option<String> {
        self.verify_purpose(token, Purpose::PasswordReset)
    }

    /// Token granting download of one stored label document.
    pub fn download_token(&self, key: &str) -> Result<String, Error> {
        self.purpose_token(key, Purpose::LabelDownload, self.download_ttl)
    }

    pub fn verify_download_token(&self, token: &str) -> Option<String> {
        self.verify_purpose(token, Purpose::LabelDownload)
    }
}
