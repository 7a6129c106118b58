// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Stripe payments.
//!
//! Payment intents are created through the Stripe REST API. Their outcome is
//! reported back through signed webhook events, checked by [`verify_webhook`].
//!

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::carriers::status_error;
use crate::error::Error;
use crate::model::money::Money;
use crate::settings::StripeSettings;

/// Accepted age of a webhook signature, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// A payment intent created by the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        user_id: &str,
    ) -> Result<PaymentIntent, Error>;
}

pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            secret_key: settings.secret_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        user_id: &str,
    ) -> Result<PaymentIntent, Error> {
        let amount = amount.cents().to_string();
        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("metadata[user_id]", user_id),
                ("automatic_payment_methods[enabled]", "true"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Stripe rejected payment intent ({}): {}", status, body);
            return Err(status_error(
                status,
                "Failed to create payment intent.".to_owned(),
            ));
        }
        Ok(response.json().await?)
    }
}

/// Check the `Stripe-Signature` header of a webhook call and parse its event.
///
/// # Errors
///
/// * `Error::BadRequest` - "Invalid signature" or "Invalid payload"
///
pub fn verify_webhook(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<Value, Error> {
    let invalid = || Error::BadRequest("Invalid signature".to_owned());
    let mut timestamp = None;
    let mut signatures = vec![];
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(invalid)?;
    if now.abs_diff(timestamp) > WEBHOOK_TOLERANCE_SECS {
        return Err(invalid());
    }
    let matches = signatures.iter().any(|signature| {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });
    if !matches {
        return Err(invalid());
    }
    serde_json::from_slice(payload).map_err(|_| Error::BadRequest("Invalid payload".to_owned()))
}

/// `Stripe-Signature` header value for a payload.
pub fn sign_webhook(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}
