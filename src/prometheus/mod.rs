// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Metrics.
//!
//! Counters are always recorded through [`Metrics`]; without the `prometheus`
//! feature its methods do nothing and `/metrics` is not served.
//!

#[cfg(feature = "prometheus")]
pub mod server;

#[cfg(feature = "prometheus")]
use std::sync::Arc;

#[cfg(feature = "prometheus")]
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[cfg(feature = "prometheus")]
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct HttpLabels {
    method: String,
    path: String,
    status: String,
}

#[cfg(feature = "prometheus")]
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CarrierLabels {
    carrier: String,
}

#[cfg(feature = "prometheus")]
struct Inner {
    registry: Registry,
    http_requests: Family<HttpLabels, Counter>,
    labels_purchased: Family<CarrierLabels, Counter>,
    balance_credited: Counter,
}

/// Service counters.
#[derive(Clone)]
pub struct Metrics {
    #[cfg(feature = "prometheus")]
    inner: Arc<Inner>,
}

impl Metrics {
    #[cfg(feature = "prometheus")]
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let http_requests = Family::<HttpLabels, Counter>::default();
        let labels_purchased = Family::<CarrierLabels, Counter>::default();
        let balance_credited = Counter::default();
        registry.register(
            "http_requests",
            "HTTP requests by method, route and status",
            http_requests.clone(),
        );
        registry.register(
            "labels_purchased",
            "Labels bought from carriers",
            labels_purchased.clone(),
        );
        registry.register(
            "balance_credited_cents",
            "Cents credited to balances by payments",
            balance_credited.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests,
                labels_purchased,
                balance_credited,
            }),
        }
    }

    #[cfg(not(feature = "prometheus"))]
    pub fn new() -> Self {
        Self {}
    }

    #[allow(unused_variables)]
    pub fn http_request(&self, method: &str, path: &str, status: u16) {
        #[cfg(feature = "prometheus")]
        self.inner
            .http_requests
            .get_or_create(&HttpLabels {
                method: method.to_owned(),
                path: path.to_owned(),
                status: status.to_string(),
            })
            .inc();
    }

    #[allow(unused_variables)]
    pub fn labels_purchased(&self, carrier: &str, count: u64) {
        #[cfg(feature = "prometheus")]
        self.inner
            .labels_purchased
            .get_or_create(&CarrierLabels {
                carrier: carrier.to_owned(),
            })
            .inc_by(count);
    }

    #[allow(unused_variables)]
    pub fn balance_credited(&self, cents: i64) {
        #[cfg(feature = "prometheus")]
        {
            if cents > 0 {
                self.inner.balance_credited.inc_by(cents as u64);
            }
        }
    }

    /// Counters in OpenMetrics text format.
    #[cfg(feature = "prometheus")]
    pub fn encode(&self) -> Result<String, crate::error::Error> {
        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &self.inner.registry)
            .map_err(|_| crate::error::Error::Internal("Error getting metrics data".to_owned()))?;
        Ok(body)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "prometheus"))]
mod tests {
    use super::*;

    #[test]
    fn test_encode_counters() {
        let metrics = Metrics::new();
        metrics.http_request("GET", "/health", 200);
        metrics.http_request("GET", "/health", 200);
        metrics.labels_purchased("FedEx", 2);
        metrics.balance_credited(2500);
        metrics.balance_credited(-10);

        let body = metrics.encode().unwrap();
        assert!(body.contains(r#"http_requests_total{method="GET",path="/health",status="200"} 2"#));
        assert!(body.contains(r#"labels_purchased_total{carrier="FedEx"} 2"#));
        assert!(body.contains("balance_credited_cents_total 2500"));
    }
}
