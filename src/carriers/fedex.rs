// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # FedEx REST client.
//!

use async_trait::async_trait;
use backon::ExponentialBuilder;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::error::Error;
use crate::model::label::{
    AddressSchema, BuyLabelRequest, Carrier, LabelDocument, PurchasedLabel, RatesRequest,
    ShipmentRate, ValidationResult,
};
use crate::settings::CarrierSettings;

use super::{default_backoff, money_of, status_error, today, CarrierClient, CarrierHttp};

const CANCELLED_MESSAGE: &str = "Shipment is successfully cancelled";

/// FedEx `signatureOptionType` of a signature option.
pub fn signature_option(option: &str) -> Result<&'static str, Error> {
    match option {
        "carrier_default" => Ok("SERVICE_DEFAULT"),
        "none" => Ok("NO_SIGNATURE_REQUIRED"),
        "direct" => Ok("DIRECT"),
        "indirect" => Ok("INDIRECT"),
        "adult" => Ok("ADULT"),
        other => Err(Error::BadRequest(format!(
            "Unsupported FedEx signature option: '{}'",
            other
        ))),
    }
}

pub struct FedExClient {
    http: CarrierHttp,
    default_contact_phone: String,
}

impl FedExClient {
    pub fn new(settings: CarrierSettings, default_contact_phone: &str) -> Self {
        Self::with_backoff(settings, default_contact_phone, default_backoff())
    }

    pub fn with_backoff(
        settings: CarrierSettings,
        default_contact_phone: &str,
        backoff: ExponentialBuilder,
    ) -> Self {
        Self {
            http: CarrierHttp::new("FedEx", settings, "/oauth/token", backoff),
            default_contact_phone: default_contact_phone.to_owned(),
        }
    }

    fn account(&self) -> Value {
        json!({ "value": self.http.settings.account_number })
    }

    fn rates_body(&self, request: &RatesRequest) -> Value {
        let packages: Vec<Value> = request
            .packages
            .iter()
            .enumerate()
            .map(|(i, package)| {
                let mut item = json!({
                    "sequenceNumber": i + 1,
                    "weight": package.get("weight").cloned().unwrap_or(Value::Null),
                });
                if let Some(dimensions) = package.get("dimensions") {
                    item["dimensions"] = dimensions.clone();
                }
                if let Some(declared) = package.get("declared_value") {
                    item["declaredValue"] = declared.clone();
                }
                item
            })
            .collect();
        json!({
            "accountNumber": self.account(),
            "rateRequestControlParameters": {
                "returnTransitTimes": true,
                "servicesNeededOnRateFailure": true,
                "variableOptions": "FREIGHT_GUARANTEE",
                "rateSortOrder": "SERVICENAMETRADITIONAL"
            },
            "requestedShipment": {
                "shipper": { "address": {
                    "postalCode": request.shipper.postal_code,
                    "countryCode": request.shipper.country_code
                }},
                "recipient": { "address": {
                    "postalCode": request.recipient.postal_code,
                    "countryCode": request.recipient.country_code
                }},
                "shipDateStamp": today(),
                "pickupType": "DROPOFF_AT_FEDEX_LOCATION",
                "rateRequestType": ["ACCOUNT", "LIST"],
                "packagingType": "YOUR_PACKAGING",
                "requestedPackageLineItems": packages
            }
        })
    }

    fn party(&self, address: &AddressSchema) -> Value {
        let phone = address
            .phone
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_contact_phone);
        json!({
            "address": {
                "streetLines": [
                    address.street_line1,
                    address.street_line2.clone().unwrap_or_default()
                ],
                "city": address.city,
                "stateOrProvinceCode": address.state,
                "postalCode": address.postal_code,
                "countryCode": address.country_code
            },
            "contact": {
                "personName": address.contact_name,
                "phoneNumber": phone
            }
        })
    }

    /// Shipment body shared by purchase and validation.
    fn shipment_body(&self, request: &BuyLabelRequest) -> Result<Value, Error> {
        let signature = signature_option(&request.signature_option)?;
        let packages: Vec<Value> = request
            .packages
            .iter()
            .map(|package| {
                let mut package = package.clone();
                if let Value::Object(map) = &mut package {
                    map.insert(
                        "packageSpecialServices".to_owned(),
                        json!({ "signatureOptionType": signature }),
                    );
                }
                package
            })
            .collect();
        Ok(json!({
            "accountNumber": self.account(),
            "labelResponseOptions": "URL_ONLY",
            "shipAction": "CONFIRM",
            "mergeLabelDocOption": request.merge_label_doc_option.as_deref().unwrap_or("NONE"),
            "requestedShipment": {
                "shipper": self.party(&request.shipper),
                "recipients": [self.party(&request.recipient)],
                "pickupType": request.pickup_type.as_deref().unwrap_or("DROPOFF_AT_FEDEX_LOCATION"),
                "serviceType": request.service_type,
                "packagingType": "YOUR_PACKAGING",
                "totalWeight": request.total_weight,
                "shippingChargesPayment": {
                    "paymentType": "SENDER",
                    "payor": { "responsibleParty": { "accountNumber": self.account() } }
                },
                "labelSpecification": {
                    "labelFormatType": "COMMON2D",
                    "imageType": "PDF",
                    "labelStockType": request.label_stock_type.as_deref().unwrap_or("PAPER_4X6"),
                    "labelStockSize": "4X6"
                },
                "shipDatestamp": request.ship_date.clone().unwrap_or_else(today),
                "requestedPackageLineItems": packages
            }
        }))
    }
}

/// Quotes of a `rate/v1/rates/quotes` response.
fn parse_rates(result: &Value) -> Vec<ShipmentRate> {
    let details = result["output"]["rateReplyDetails"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    details
        .iter()
        .filter_map(|rate| {
            let service_type = rate["serviceType"].as_str()?.to_owned();
            let Some(total_charge) = money_of(&rate["ratedShipmentDetails"][0]["totalNetFedExCharge"])
            else {
                log::warn!("FedEx rate for {} has no total charge", service_type);
                return None;
            };
            Some(ShipmentRate {
                service_provider: Carrier::FedEx.to_string(),
                service_type,
                total_charge,
                delivery_promise: rate["commit"]["dateDetail"]["dayFormat"]
                    .as_str()
                    .unwrap_or_default()
                    .to_owned(),
            })
        })
        .collect()
}

/// Labels of a `ship/v1/shipments` response.
fn parse_labels(result: &Value) -> Result<Vec<PurchasedLabel>, Error> {
    let pieces = result["output"]["transactionShipments"][0]["pieceResponses"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    pieces
        .iter()
        .map(|piece| {
            let tracking_number = piece["trackingNumber"]
                .as_str()
                .ok_or_else(|| Error::External("FedEx label response missing tracking number.".to_owned()))?
                .to_owned();
            let url = piece["packageDocuments"][0]["url"]
                .as_str()
                .ok_or_else(|| Error::External("FedEx label response missing document.".to_owned()))?
                .to_owned();
            Ok(PurchasedLabel {
                tracking_number,
                document: LabelDocument::Url(url),
                cost: money_of(&piece["baseRateAmount"]),
            })
        })
        .collect()
}

#[async_trait]
impl CarrierClient for FedExClient {
    fn carrier(&self) -> Carrier {
        Carrier::FedEx
    }

    async fn rates(&self, request: &RatesRequest) -> Result<Vec<ShipmentRate>, Error> {
        let body = self.rates_body(request);
        let result = self
            .http
            .with_retry("get rates", || {
                self.http
                    .send_ok(Method::POST, "/rate/v1/rates/quotes", Some(&body), "get rates")
            })
            .await?;
        Ok(parse_rates(&result))
    }

    async fn buy(&self, request: &BuyLabelRequest) -> Result<Vec<PurchasedLabel>, Error> {
        let body = self.shipment_body(request)?;
        let result = self
            .http
            .with_retry("buy label", || {
                self.http
                    .send_ok(Method::POST, "/ship/v1/shipments", Some(&body), "buy label")
            })
            .await?;
        let labels = parse_labels(&result)?;
        if labels.is_empty() {
            return Err(Error::External("FedEx did not return label details.".to_owned()));
        }
        Ok(labels)
    }

    async fn cancel(&self, tracking_number: &str) -> Result<(), Error> {
        let body = json!({
            "accountNumber": self.account(),
            "emailShipment": "false",
            "senderCountryCode": "US",
            "deletionControl": "DELETE_ALL_PACKAGES",
            "trackingNumber": tracking_number
        });
        let result = self
            .http
            .with_retry("cancel label", || {
                self.http.send_ok(
                    Method::PUT,
                    "/ship/v1/shipments/cancel",
                    Some(&body),
                    "cancel label",
                )
            })
            .await?;
        if result["output"]["message"].as_str() == Some(CANCELLED_MESSAGE) {
            Ok(())
        } else {
            Err(Error::External(format!(
                "fail to cancel fedex label {}",
                tracking_number
            )))
        }
    }

    async fn validate(&self, request: &BuyLabelRequest) -> Result<ValidationResult, Error> {
        let body = self.shipment_body(request)?;
        self.http
            .with_retry("validate shipment", || async {
                let (status, result) = self
                    .http
                    .send(
                        Method::POST,
                        "/ship/v1/shipments/packages/validate",
                        Some(&body),
                    )
                    .await?;
                match status {
                    StatusCode::OK => Ok(ValidationResult {
                        success: true,
                        error: None,
                    }),
                    StatusCode::BAD_REQUEST => Ok(ValidationResult {
                        success: false,
                        error: Some(
                            result["errors"][0]["code"]
                                .as_str()
                                .unwrap_or_default()
                                .to_owned(),
                        ),
                    }),
                    status => Err(status_error(
                        status,
                        "Failed validate shipment with FedEx.".to_owned(),
                    )),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{
        extract::State,
        http::StatusCode as HttpStatus,
        routing::{post, put},
        Json, Router,
    };

    use super::*;
    use crate::carriers::testing::{fast_backoff, serve, settings};
    use crate::model::money::Money;

    #[derive(Default)]
    struct Counters {
        tokens: AtomicUsize,
        quotes: AtomicUsize,
    }

    fn address(zip: &str) -> AddressSchema {
        AddressSchema {
            contact_name: "Ada Lovelace".to_owned(),
            company_name: None,
            street_line1: "1 Main St".to_owned(),
            street_line2: None,
            city: "Memphis".to_owned(),
            state: "TN".to_owned(),
            postal_code: zip.to_owned(),
            country_code: "US".to_owned(),
            phone: None,
            email: None,
        }
    }

    fn buy_request(signature: &str) -> BuyLabelRequest {
        BuyLabelRequest {
            order_number: Some("1001".to_owned()),
            service_type: "FEDEX_GROUND".to_owned(),
            pickup_type: None,
            total_weight: Some(5.0),
            ship_date: None,
            label_stock_type: None,
            merge_label_doc_option: None,
            shipper: address("38115"),
            recipient: address("90210"),
            packages: vec![json!({"weight": {"units": "LB", "value": 5.0}})],
            signature_option: signature.to_owned(),
        }
    }

    async fn fake_fedex(counters: Arc<Counters>, failures_before_quote: usize) -> String {
        let router = Router::new()
            .route(
                "/oauth/token",
                post(|State(c): State<Arc<Counters>>| async move {
                    c.tokens.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"access_token": "tok", "expires_in": 3599}))
                }),
            )
            .route(
                "/rate/v1/rates/quotes",
                post(move |State(c): State<Arc<Counters>>| async move {
                    let n = c.quotes.fetch_add(1, Ordering::SeqCst);
                    if n < failures_before_quote {
                        return (HttpStatus::SERVICE_UNAVAILABLE, Json(json!({})));
                    }
                    (
                        HttpStatus::OK,
                        Json(json!({"output": {"rateReplyDetails": [
                            {
                                "serviceType": "FEDEX_GROUND",
                                "ratedShipmentDetails": [{"totalNetFedExCharge": 12.34}],
                                "commit": {"dateDetail": {"dayFormat": "3 days"}}
                            },
                            {
                                "serviceType": "PRIORITY_OVERNIGHT",
                                "ratedShipmentDetails": [{"totalNetFedExCharge": "45.6"}]
                            }
                        ]}})),
                    )
                }),
            )
            .route(
                "/ship/v1/shipments",
                post(|Json(body): Json<Value>| async move {
                    let signature = body["requestedShipment"]["requestedPackageLineItems"][0]
                        ["packageSpecialServices"]["signatureOptionType"]
                        .clone();
                    Json(json!({"output": {"transactionShipments": [{"pieceResponses": [{
                        "trackingNumber": "794600000001",
                        "packageDocuments": [{"url": "http://docs/1.pdf"}],
                        "baseRateAmount": 11.0,
                        "signature": signature
                    }]}]}}))
                }),
            )
            .route(
                "/ship/v1/shipments/cancel",
                put(|Json(body): Json<Value>| async move {
                    let message = if body["trackingNumber"] == "794600000001" {
                        CANCELLED_MESSAGE
                    } else {
                        "Shipment not found"
                    };
                    Json(json!({"output": {"message": message}}))
                }),
            )
            .route(
                "/ship/v1/shipments/packages/validate",
                post(|Json(body): Json<Value>| async move {
                    if body["requestedShipment"]["totalWeight"].is_null() {
                        (
                            HttpStatus::BAD_REQUEST,
                            Json(json!({"errors": [{"code": "WEIGHT.MISSING"}]})),
                        )
                    } else {
                        (HttpStatus::OK, Json(json!({"output": {}})))
                    }
                }),
            )
            .with_state(counters);
        serve(router).await
    }

    #[test]
    fn test_signature_options() {
        assert_eq!(signature_option("carrier_default").unwrap(), "SERVICE_DEFAULT");
        assert_eq!(signature_option("none").unwrap(), "NO_SIGNATURE_REQUIRED");
        assert_eq!(signature_option("adult").unwrap(), "ADULT");
        assert!(matches!(signature_option("wet-ink"), Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_rates_and_token_cache() {
        let counters = Arc::new(Counters::default());
        let url = fake_fedex(counters.clone(), 0).await;
        let client = FedExClient::with_backoff(settings(&url), "5550000", fast_backoff());
        let request = buy_request("none").rates_request();

        let rates = client.rates(&request).await.unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].service_type, "FEDEX_GROUND");
        assert_eq!(rates[0].total_charge, Money::from_cents(1234));
        assert_eq!(rates[0].delivery_promise, "3 days");
        assert_eq!(rates[1].total_charge, Money::from_cents(4560));
        assert_eq!(rates[1].delivery_promise, "");

        client.rates(&request).await.unwrap();
        assert_eq!(counters.tokens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rates_retry_server_errors() {
        let counters = Arc::new(Counters::default());
        let url = fake_fedex(counters.clone(), 2).await;
        let client = FedExClient::with_backoff(settings(&url), "", fast_backoff());
        let rates = client
            .rates(&buy_request("none").rates_request())
            .await
            .unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(counters.quotes.load(Ordering::SeqCst), 3);

        let counters = Arc::new(Counters::default());
        let url = fake_fedex(counters.clone(), 5).await;
        let client = FedExClient::with_backoff(settings(&url), "", fast_backoff());
        let result = client.rates(&buy_request("none").rates_request()).await;
        assert!(matches!(result, Err(Error::ExternalServer(_))));
        assert_eq!(counters.quotes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_buy_and_cancel() {
        let url = fake_fedex(Arc::new(Counters::default()), 0).await;
        let client = FedExClient::with_backoff(settings(&url), "5550000", fast_backoff());

        let labels = client.buy(&buy_request("direct")).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].tracking_number, "794600000001");
        assert_eq!(
            labels[0].document,
            LabelDocument::Url("http://docs/1.pdf".to_owned())
        );
        assert_eq!(labels[0].cost, Some(Money::from_cents(1100)));

        assert!(matches!(
            client.buy(&buy_request("wet-ink")).await,
            Err(Error::BadRequest(_))
        ));

        client.cancel("794600000001").await.unwrap();
        assert_eq!(
            client.cancel("000").await,
            Err(Error::External("fail to cancel fedex label 000".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_validate() {
        let url = fake_fedex(Arc::new(Counters::default()), 0).await;
        let client = FedExClient::with_backoff(settings(&url), "", fast_backoff());
        let ok = client.validate(&buy_request("none")).await.unwrap();
        assert_eq!(
            ok,
            ValidationResult {
                success: true,
                error: None
            }
        );
        let mut request = buy_request("none");
        request.total_weight = None;
        let failed = client.validate(&request).await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("WEIGHT.MISSING"));
    }

    #[tokio::test]
    async fn test_unreachable_carrier() {
        let client = FedExClient::with_backoff(settings("http://127.0.0.1:9"), "", fast_backoff());
        let result = client.rates(&buy_request("none").rates_request()).await;
        assert!(matches!(result, Err(Error::External(_))));
    }
}
