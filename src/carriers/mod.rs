// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Carrier clients.
//!
//! Every carrier sits behind [`CarrierClient`]. The HTTP clients share the
//! OAuth client-credentials token cache, the status code mapping and the
//! retry policy defined here.
//!

pub mod fedex;
pub mod usps;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::model::label::{
    BuyLabelRequest, Carrier, PurchasedLabel, RatesRequest, ShipmentRate, ValidationResult,
};
use crate::model::money::Money;
use crate::settings::CarrierSettings;

pub use fedex::FedExClient;
pub use usps::UspsClient;

/// Lifetime of a cached carrier access token.
pub const TOKEN_TTL: Duration = Duration::from_secs(3500);

#[async_trait]
pub trait CarrierClient: Send + Sync {
    fn carrier(&self) -> Carrier;

    /// Quotes for a shipment, in carrier prices.
    async fn rates(&self, request: &RatesRequest) -> Result<Vec<ShipmentRate>, Error>;

    /// Buy the labels of a shipment.
    async fn buy(&self, request: &BuyLabelRequest) -> Result<Vec<PurchasedLabel>, Error>;

    async fn cancel(&self, tracking_number: &str) -> Result<(), Error>;

    /// Check a shipment without buying it.
    async fn validate(&self, _request: &BuyLabelRequest) -> Result<ValidationResult, Error> {
        Err(Error::UnsupportedCarrier(self.carrier().to_string()))
    }
}

/// The carrier clients known to the service.
#[derive(Clone)]
pub struct Carriers {
    pub fedex: Arc<dyn CarrierClient>,
    pub usps: Arc<dyn CarrierClient>,
}

impl Carriers {
    pub fn new(fedex: Arc<dyn CarrierClient>, usps: Arc<dyn CarrierClient>) -> Self {
        Self { fedex, usps }
    }

    /// Client for a carrier.
    ///
    /// # Errors
    ///
    /// * `Error::UnsupportedCarrier` - no client for the carrier
    ///
    pub fn get(&self, carrier: Carrier) -> Result<Arc<dyn CarrierClient>, Error> {
        match carrier {
            Carrier::FedEx => Ok(self.fedex.clone()),
            Carrier::Usps => Ok(self.usps.clone()),
            other => Err(Error::UnsupportedCarrier(other.to_string())),
        }
    }
}

/// Parse a carrier path segment, ignoring case.
pub fn parse_carrier(name: &str) -> Result<Carrier, Error> {
    [Carrier::FedEx, Carrier::Ups, Carrier::Usps, Carrier::Other]
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::UnsupportedCarrier(name.to_owned()))
}

/// Up to 3 attempts, exponential backoff between 3 and 10 seconds.
pub fn default_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(3))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(2)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct CachedToken {
    value: String,
    fetched: Instant,
}

/// HTTP plumbing shared by the carrier clients.
pub(crate) struct CarrierHttp {
    name: &'static str,
    http: reqwest::Client,
    pub(crate) settings: CarrierSettings,
    token_path: &'static str,
    token: Mutex<Option<CachedToken>>,
    backoff: ExponentialBuilder,
}

impl CarrierHttp {
    pub(crate) fn new(
        name: &'static str,
        settings: CarrierSettings,
        token_path: &'static str,
        backoff: ExponentialBuilder,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            name,
            http,
            settings,
            token_path,
            token: Mutex::new(None),
            backoff,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Cached client-credentials access token.
    pub(crate) async fn access_token(&self) -> Result<String, Error> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.fetched.elapsed() < TOKEN_TTL {
                return Ok(token.value.clone());
            }
        }
        log::debug!("Fetching new {} access token", self.name);
        let response = self
            .http
            .post(self.url(self.token_path))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(
                status,
                format!("Failed to authenticate with {}.", self.name),
            ));
        }
        let token: TokenResponse = response.json().await?;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            fetched: Instant::now(),
        });
        Ok(token.access_token)
    }

    /// Send an authenticated request, returning the status and the JSON body
    /// (`Value::Null` when the body is not JSON).
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), Error> {
        let token = self.access_token().await?;
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(token)
            .header("X-locale", "en_US");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| {
            log::error!("Request to {} {} {} failed: {}", self.name, method, path, e);
            Error::from(e)
        })?;
        let status = response.status();
        let text = response.text().await?;
        log::debug!("{} response ({} {}): {} {}", self.name, method, path, status, text);
        let value = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok((status, value))
    }

    /// Like [`CarrierHttp::send`], failing on any status other than 200.
    pub(crate) async fn send_ok(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        what: &str,
    ) -> Result<Value, Error> {
        let (status, value) = self.send(method, path, body).await?;
        if status == StatusCode::OK {
            Ok(value)
        } else {
            Err(status_error(
                status,
                format!("Failed to {} from {}.", what, self.name),
            ))
        }
    }

    /// Run `call`, retrying transient failures.
    pub(crate) async fn with_retry<T, F, Fut>(&self, what: &str, call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        call.retry(self.backoff)
            .when(|e: &Error| e.is_transient())
            .notify(|e: &Error, after: Duration| {
                log::warn!(
                    "{} {} failed, retrying in {:?}: {}",
                    self.name,
                    what,
                    after,
                    e
                )
            })
            .await
    }
}

/// Error for a non-success carrier status.
pub(crate) fn status_error(status: StatusCode, message: String) -> Error {
    if status.is_client_error() {
        Error::ExternalClient(message)
    } else if status.is_server_error() {
        Error::ExternalServer(message)
    } else {
        Error::External(message)
    }
}

/// Money amount from a carrier JSON value: a number, a decimal string or an
/// object holding one under `amount`, `value` or `price`.
pub(crate) fn money_of(value: &Value) -> Option<Money> {
    match value {
        Value::Number(n) => Money::parse(&n.to_string()).ok(),
        Value::String(s) => Money::parse(s).ok(),
        Value::Object(map) => ["amount", "value", "price"]
            .iter()
            .filter_map(|k| map.get(*k))
            .find(|v| !v.is_null())
            .and_then(money_of),
        _ => None,
    }
}

/// Today in the carriers' date format.
pub(crate) fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-crate carrier double and a fake carrier HTTP server.

    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::model::label::LabelDocument;

    /// Carrier double returning canned answers and recording calls.
    pub struct FakeCarrier {
        pub carrier: Carrier,
        pub rates: Vec<ShipmentRate>,
        pub labels: Vec<PurchasedLabel>,
        pub fail_cancel: bool,
        pub calls: StdMutex<Vec<String>>,
    }

    impl FakeCarrier {
        pub fn new(carrier: Carrier, rates: &[(&str, &str)]) -> Self {
            Self {
                carrier,
                rates: rates
                    .iter()
                    .map(|(service, charge)| ShipmentRate {
                        service_provider: carrier.to_string(),
                        service_type: service.to_string(),
                        total_charge: Money::parse(charge).unwrap(),
                        delivery_promise: "3 days".to_owned(),
                    })
                    .collect(),
                labels: vec![],
                fail_cancel: false,
                calls: StdMutex::new(vec![]),
            }
        }

        pub fn with_label(mut self, tracking: &str, cost: Option<&str>) -> Self {
            self.labels.push(PurchasedLabel {
                tracking_number: tracking.to_owned(),
                document: LabelDocument::Bytes {
                    data: b"%PDF-1.4 label".to_vec(),
                    extension: "pdf".to_owned(),
                },
                cost: cost.map(|c| Money::parse(c).unwrap()),
            });
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CarrierClient for FakeCarrier {
        fn carrier(&self) -> Carrier {
            self.carrier
        }

        async fn rates(&self, _request: &RatesRequest) -> Result<Vec<ShipmentRate>, Error> {
            self.calls.lock().unwrap().push("rates".to_owned());
            Ok(self.rates.clone())
        }

        async fn buy(&self, request: &BuyLabelRequest) -> Result<Vec<PurchasedLabel>, Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("buy {}", request.service_type));
            Ok(self.labels.clone())
        }

        async fn cancel(&self, tracking_number: &str) -> Result<(), Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("cancel {}", tracking_number));
            if self.fail_cancel {
                return Err(Error::ExternalClient("Failed to cancel label.".to_owned()));
            }
            Ok(())
        }
    }

    /// Backoff without delays for tests.
    pub fn fast_backoff() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_max_times(2)
    }

    /// Serve `router` on a local port, returning its base URL.
    pub async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub fn settings(base_url: &str) -> CarrierSettings {
        CarrierSettings {
            base_url: base_url.to_owned(),
            account_number: "740561073".to_owned(),
            client_id: "client".to_owned(),
            client_secret: "secret".to_owned(),
        }
    }
}
