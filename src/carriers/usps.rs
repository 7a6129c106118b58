// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # USPS REST client.
//!
//! The label API answers in several shapes; [`normalize_labels`] and the
//! `extract_*` helpers find the label entries, their tracking numbers, prices
//! and documents wherever they are.
//!

use async_trait::async_trait;
use backon::ExponentialBuilder;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::model::label::{
    AddressSchema, BuyLabelRequest, Carrier, LabelDocument, PurchasedLabel, RatesRequest,
    ShipmentRate,
};
use crate::settings::CarrierSettings;
use crate::storage::extension_for;
use crate::utils::{parse_name, parse_zipcode};

use super::{default_backoff, money_of, today, CarrierClient, CarrierHttp};

/// Mail classes quoted by [`UspsClient::rates`].
pub const MAIL_CLASSES: [&str; 3] = [
    "USPS_GROUND_ADVANTAGE",
    "PRIORITY_MAIL_EXPRESS",
    "PRIORITY_MAIL",
];

/// Extra service codes requesting a signature option for a mail class.
pub fn signature_codes(option: &str, mail_class: &str) -> Result<&'static [u32], Error> {
    let codes: Option<&'static [u32]> = match (mail_class, option) {
        (_, "carrier_default") if MAIL_CLASSES.contains(&mail_class) => Some(&[]),
        (_, "none") if MAIL_CLASSES.contains(&mail_class) => Some(&[920]),
        (_, "adult") if MAIL_CLASSES.contains(&mail_class) => Some(&[922]),
        ("PRIORITY_MAIL_EXPRESS", "direct") => Some(&[981]),
        ("PRIORITY_MAIL_EXPRESS", "indirect") => Some(&[986]),
        ("PRIORITY_MAIL", "direct") => Some(&[921]),
        ("PRIORITY_MAIL", "indirect") => Some(&[924]),
        ("USPS_GROUND_ADVANTAGE", "direct") | ("USPS_GROUND_ADVANTAGE", "indirect") => {
            Some(&[921])
        }
        _ => None,
    };
    codes.ok_or_else(|| {
        Error::BadRequest(format!(
            "Invalid combination: shipping_method='{}', option='{}'",
            mail_class, option
        ))
    })
}

pub struct UspsClient {
    http: CarrierHttp,
}

impl UspsClient {
    pub fn new(settings: CarrierSettings) -> Self {
        Self::with_backoff(settings, default_backoff())
    }

    pub fn with_backoff(settings: CarrierSettings, backoff: ExponentialBuilder) -> Self {
        Self {
            http: CarrierHttp::new("USPS", settings, "/oauth2/v3/token", backoff),
        }
    }

    fn single_package(packages: &[Value]) -> Result<&Value, Error> {
        match packages {
            [package] => Ok(package),
            _ => Err(Error::BadRequest(
                "USPS supports exactly one package per shipment".to_owned(),
            )),
        }
    }

    fn rates_body(&self, request: &RatesRequest) -> Result<Value, Error> {
        let package = Self::single_package(&request.packages)?;
        Ok(json!({
            "originZIPCode": request.shipper.postal_code,
            "destinationZIPCode": request.recipient.postal_code,
            "weight": package["weight"]["value"],
            "length": package["dimensions"]["length"],
            "width": package["dimensions"]["width"],
            "height": package["dimensions"]["height"],
            "mailClasses": MAIL_CLASSES,
            "priceType": "COMMERCIAL",
            "mailingDate": today(),
            "accountType": "EPS",
            "accountNumber": self.http.settings.account_number,
            "hasNonstandardCharacteristics": false
        }))
    }

    fn label_body(&self, request: &BuyLabelRequest) -> Result<Value, Error> {
        let package = Self::single_package(&request.packages)?;
        let extra_services = signature_codes(&request.signature_option, &request.service_type)?;
        let address = |a: &AddressSchema, with_plus4: bool| {
            let (first_name, last_name) = parse_name(&a.contact_name);
            let (zip, plus4) = parse_zipcode(&a.postal_code);
            let mut value = json!({
                "firstName": first_name,
                "lastName": last_name,
                "streetAddress": a.street_line1,
                "secondaryAddress": a.street_line2,
                "city": a.city,
                "state": a.state,
                "ZIPCode": zip
            });
            if with_plus4 {
                value["ZIPPlus4"] = json!(plus4);
            }
            value
        };
        Ok(json!({
            "toAddress": address(&request.recipient, true),
            "fromAddress": address(&request.shipper, false),
            "packageDescription": {
                "mailClass": request.service_type,
                "rateIndicator": "SP",
                "weightUOM": "lb",
                "weight": package["weight"]["value"],
                "dimensionsUOM": "in",
                "length": package["dimensions"]["length"],
                "height": package["dimensions"]["height"],
                "width": package["dimensions"]["width"],
                "processingCategory": "NONSTANDARD",
                "mailingDate": request.ship_date.clone().unwrap_or_else(today),
                "extraServices": extra_services,
                "destinationEntryFacilityType": "NONE"
            }
        }))
    }
}

/// Lowest quote per mail class of a base rates search, in first seen order.
fn lowest_rates(result: &Value) -> Vec<ShipmentRate> {
    let mut best: Vec<ShipmentRate> = vec![];
    let options = result["rateOptions"].as_array().cloned().unwrap_or_default();
    for rate in options
        .iter()
        .filter_map(|option| option["rates"].as_array())
        .flatten()
    {
        let (Some(mail_class), Some(price)) = (rate["mailClass"].as_str(), money_of(&rate["price"]))
        else {
            continue;
        };
        let candidate = ShipmentRate {
            service_provider: Carrier::Usps.to_string(),
            service_type: mail_class.to_owned(),
            total_charge: price,
            delivery_promise: rate["productDefinition"]
                .as_str()
                .unwrap_or_default()
                .to_owned(),
        };
        match best.iter_mut().find(|r| r.service_type == mail_class) {
            Some(current) if price < current.total_charge => *current = candidate,
            Some(_) => {}
            None => best.push(candidate),
        }
    }
    best
}

const LIST_KEYS: [&str; 6] = [
    "labels",
    "label",
    "labelDetails",
    "labelResponses",
    "labelList",
    "shippingLabels",
];
const WRAPPER_KEYS: [&str; 3] = ["data", "result", "response"];
const URL_KEYS: [&str; 7] = [
    "labelUrl",
    "labelURL",
    "label_url",
    "url",
    "downloadUrl",
    "downloadURL",
    "href",
];
const URL_SECTIONS: [&str; 4] = ["labelDownload", "labelDocument", "labelFile", "document"];
const DOCUMENT_KEYS: [&str; 6] = [
    "labelData",
    "label",
    "labelBytes",
    "labelFile",
    "labelDocument",
    "document",
];

fn objects(values: &[Value]) -> Vec<Map<String, Value>> {
    values
        .iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

/// Label entries of a label response.
pub fn normalize_labels(response: &Value) -> Vec<Map<String, Value>> {
    match response {
        Value::Object(map) => {
            for key in LIST_KEYS {
                match map.get(key) {
                    Some(Value::Array(items)) => return objects(items),
                    Some(Value::Object(item)) => return vec![item.clone()],
                    _ => {}
                }
            }
            for key in WRAPPER_KEYS {
                if let Some(nested) = map.get(key) {
                    let labels = normalize_labels(nested);
                    if !labels.is_empty() {
                        return labels;
                    }
                }
            }
            vec![map.clone()]
        }
        Value::Array(items) => objects(items),
        _ => vec![],
    }
}

fn url_in(map: &Map<String, Value>) -> Option<String> {
    URL_KEYS
        .iter()
        .filter_map(|k| map.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Download URL of a label entry.
pub fn extract_url(payload: &Map<String, Value>) -> Option<String> {
    if let Some(url) = url_in(payload) {
        return Some(url);
    }
    for section in URL_SECTIONS {
        match payload.get(section) {
            Some(Value::Object(nested)) => {
                if let Some(url) = url_in(nested) {
                    return Some(url);
                }
            }
            Some(Value::Array(items)) => {
                if let Some(url) = items.iter().filter_map(Value::as_object).find_map(url_in) {
                    return Some(url);
                }
            }
            _ => {}
        }
    }
    payload
        .get("links")?
        .as_array()?
        .iter()
        .filter_map(|link| link["href"].as_str())
        .find(|href| !href.is_empty())
        .map(str::to_owned)
}

fn decode_candidate(candidate: &Value) -> Option<(Vec<u8>, String)> {
    match candidate {
        Value::Object(map) => {
            let content_type = ["contentType", "mimeType", "type", "format"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(Value::as_str);
            let data = ["data", "content", "value", "file", "bytes", "label"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find(|v| !v.is_null())?;
            let (bytes, extension) = decode_candidate(data)?;
            let extension = content_type
                .map(|ct| extension_for(ct).to_owned())
                .unwrap_or(extension);
            Some((bytes, extension))
        }
        Value::String(text) if !text.is_empty() => {
            let (content_type, encoded) = match text.strip_prefix("data:") {
                Some(rest) => {
                    let (header, encoded) = rest.split_once(',')?;
                    (header.split(';').next(), encoded)
                }
                None => (None, text.as_str()),
            };
            let bytes = STANDARD.decode(encoded.trim()).ok()?;
            Some((bytes, extension_for(content_type.unwrap_or_default()).to_owned()))
        }
        _ => None,
    }
}

/// Inline document of a label entry and its file extension.
pub fn extract_bytes(payload: &Map<String, Value>) -> Option<(Vec<u8>, String)> {
    DOCUMENT_KEYS
        .iter()
        .filter_map(|k| payload.get(*k))
        .find_map(|candidate| match candidate {
            Value::Array(items) => items.iter().find_map(decode_candidate),
            other => decode_candidate(other),
        })
}

pub fn extract_tracking_number(payload: &Map<String, Value>) -> Option<String> {
    ["trackingNumber", "tracking_number", "trackingId"]
        .iter()
        .filter_map(|k| payload.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

fn extract_label(payload: &Map<String, Value>) -> Result<PurchasedLabel, Error> {
    let tracking_number = extract_tracking_number(payload).ok_or_else(|| {
        Error::External("USPS label response missing tracking number.".to_owned())
    })?;
    let document = match extract_url(payload) {
        Some(url) => LabelDocument::Url(url),
        None => {
            let (data, extension) = extract_bytes(payload).ok_or_else(|| {
                Error::External("USPS label response missing printable document.".to_owned())
            })?;
            LabelDocument::Bytes { data, extension }
        }
    };
    let cost = ["price", "amount", "totalPrice"]
        .iter()
        .filter_map(|k| payload.get(*k))
        .find_map(money_of);
    Ok(PurchasedLabel {
        tracking_number,
        document,
        cost,
    })
}

#[async_trait]
impl CarrierClient for UspsClient {
    fn carrier(&self) -> Carrier {
        Carrier::Usps
    }

    async fn rates(&self, request: &RatesRequest) -> Result<Vec<ShipmentRate>, Error> {
        let body = self.rates_body(request)?;
        let result = self
            .http
            .with_retry("get rates", || {
                self.http.send_ok(
                    Method::POST,
                    "/prices/v3/base-rates-list/search",
                    Some(&body),
                    "get rates",
                )
            })
            .await?;
        Ok(lowest_rates(&result))
    }

    async fn buy(&self, request: &BuyLabelRequest) -> Result<Vec<PurchasedLabel>, Error> {
        let body = self.label_body(request)?;
        let result = self
            .http
            .with_retry("buy label", || {
                self.http
                    .send_ok(Method::POST, "/labels/v3/label", Some(&body), "buy label")
            })
            .await?;
        let payloads = normalize_labels(&result);
        if payloads.is_empty() {
            return Err(Error::External("USPS did not return label details.".to_owned()));
        }
        payloads.iter().map(extract_label).collect()
    }

    async fn cancel(&self, tracking_number: &str) -> Result<(), Error> {
        let path = format!("/labels/v3/label/{}", tracking_number);
        let result = self
            .http
            .with_retry("cancel label", || {
                self.http
                    .send_ok(Method::DELETE, &path, None, "cancel label")
            })
            .await?;
        log::info!(
            "USPS label {} cancelled, refund amount {}",
            tracking_number,
            result["refundAmount"]
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::{routing::post, Json, Router};

    use super::*;
    use crate::carriers::testing::{fast_backoff, serve, settings};
    use crate::model::money::Money;

    #[test]
    fn test_signature_codes() {
        let expected: [(&str, &str, &[u32]); 15] = [
            ("PRIORITY_MAIL_EXPRESS", "carrier_default", &[]),
            ("PRIORITY_MAIL_EXPRESS", "none", &[920]),
            ("PRIORITY_MAIL_EXPRESS", "direct", &[981]),
            ("PRIORITY_MAIL_EXPRESS", "indirect", &[986]),
            ("PRIORITY_MAIL_EXPRESS", "adult", &[922]),
            ("PRIORITY_MAIL", "carrier_default", &[]),
            ("PRIORITY_MAIL", "none", &[920]),
            ("PRIORITY_MAIL", "direct", &[921]),
            ("PRIORITY_MAIL", "indirect", &[924]),
            ("PRIORITY_MAIL", "adult", &[922]),
            ("USPS_GROUND_ADVANTAGE", "carrier_default", &[]),
            ("USPS_GROUND_ADVANTAGE", "none", &[920]),
            ("USPS_GROUND_ADVANTAGE", "direct", &[921]),
            ("USPS_GROUND_ADVANTAGE", "indirect", &[921]),
            ("USPS_GROUND_ADVANTAGE", "adult", &[922]),
        ];
        for (mail_class, option, codes) in expected {
            assert_eq!(signature_codes(option, mail_class).unwrap(), codes);
        }
        assert!(signature_codes("unknown", "PRIORITY_MAIL").is_err());
        assert!(signature_codes("direct", "UNKNOWN_SERVICE").is_err());
        assert!(signature_codes("none", "UNKNOWN_SERVICE").is_err());
    }

    #[test]
    fn test_lowest_rates() {
        let result = json!({"rateOptions": [
            {"rates": [
                {"mailClass": "PRIORITY_MAIL", "price": 9.5, "productDefinition": "2 days"},
                {"mailClass": "USPS_GROUND_ADVANTAGE", "price": "6.10"}
            ]},
            {"rates": [
                {"mailClass": "PRIORITY_MAIL", "price": 8.75, "productDefinition": "2-3 days"},
                {"mailClass": "USPS_GROUND_ADVANTAGE", "price": 7.0},
                {"price": 1.0}
            ]}
        ]});
        let rates = lowest_rates(&result);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].service_type, "PRIORITY_MAIL");
        assert_eq!(rates[0].total_charge, Money::from_cents(875));
        assert_eq!(rates[0].delivery_promise, "2-3 days");
        assert_eq!(rates[1].total_charge, Money::from_cents(610));
        assert!(lowest_rates(&json!({})).is_empty());
    }

    #[test]
    fn test_normalize_labels() {
        let listed = json!({"labels": [{"trackingNumber": "1"}, "junk", {"trackingNumber": "2"}]});
        assert_eq!(normalize_labels(&listed).len(), 2);

        let single = json!({"labelDetails": {"trackingNumber": "3"}});
        assert_eq!(normalize_labels(&single)[0]["trackingNumber"], "3");

        let wrapped = json!({"data": {"shippingLabels": [{"trackingId": "4"}]}});
        let labels = normalize_labels(&wrapped);
        assert_eq!(extract_tracking_number(&labels[0]).as_deref(), Some("4"));

        let flat = json!({"trackingNumber": "5", "labelUrl": "http://x/5.pdf"});
        assert_eq!(normalize_labels(&flat).len(), 1);
        assert!(normalize_labels(&json!("text")).is_empty());
    }

    #[test]
    fn test_extract_url() {
        let nested = json!({"labelDownload": {"downloadURL": "http://x/a.pdf"}});
        assert_eq!(
            extract_url(nested.as_object().unwrap()).as_deref(),
            Some("http://x/a.pdf")
        );
        let listed = json!({"document": [{"other": 1}, {"href": "http://x/b.pdf"}]});
        assert_eq!(
            extract_url(listed.as_object().unwrap()).as_deref(),
            Some("http://x/b.pdf")
        );
        let links = json!({"links": [{"rel": "self"}, {"href": "http://x/c.pdf"}]});
        assert_eq!(
            extract_url(links.as_object().unwrap()).as_deref(),
            Some("http://x/c.pdf")
        );
        assert_eq!(extract_url(json!({"labelData": "AAAA"}).as_object().unwrap()), None);
    }

    #[test]
    fn test_extract_bytes() {
        let encoded = STANDARD.encode(b"label-bytes");
        let plain = json!({ "labelData": encoded });
        assert_eq!(
            extract_bytes(plain.as_object().unwrap()),
            Some((b"label-bytes".to_vec(), "pdf".to_owned()))
        );

        let data_uri = json!({ "label": format!("data:image/png;base64,{}", encoded) });
        assert_eq!(
            extract_bytes(data_uri.as_object().unwrap()).map(|(_, ext)| ext),
            Some("png".to_owned())
        );

        let described = json!({ "labelFile": {"contentType": "application/zpl", "content": encoded} });
        assert_eq!(
            extract_bytes(described.as_object().unwrap()).map(|(_, ext)| ext),
            Some("zpl".to_owned())
        );

        let broken = json!({ "labelData": "***not base64***" });
        assert_eq!(extract_bytes(broken.as_object().unwrap()), None);
    }

    fn buy_request() -> BuyLabelRequest {
        let address = AddressSchema {
            contact_name: "Grace Brewster Hopper".to_owned(),
            company_name: None,
            street_line1: "2 Navy Way".to_owned(),
            street_line2: Some("Apt 1".to_owned()),
            city: "Arlington".to_owned(),
            state: "VA".to_owned(),
            postal_code: "22202-1234".to_owned(),
            country_code: "US".to_owned(),
            phone: None,
            email: None,
        };
        BuyLabelRequest {
            order_number: Some("1002".to_owned()),
            service_type: "PRIORITY_MAIL".to_owned(),
            pickup_type: None,
            total_weight: None,
            ship_date: Some("2024-05-01".to_owned()),
            label_stock_type: None,
            merge_label_doc_option: None,
            shipper: address.clone(),
            recipient: address,
            packages: vec![json!({
                "weight": {"value": 2},
                "dimensions": {"length": 10, "width": 6, "height": 4}
            })],
            signature_option: "indirect".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_buy_label() {
        let router = Router::new()
            .route(
                "/oauth2/v3/token",
                post(|| async { Json(json!({"access_token": "tok"})) }),
            )
            .route(
                "/labels/v3/label",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["packageDescription"]["extraServices"], json!([924]));
                    assert_eq!(body["toAddress"]["ZIPCode"], "22202");
                    assert_eq!(body["toAddress"]["ZIPPlus4"], "1234");
                    assert_eq!(body["fromAddress"]["firstName"], "Grace");
                    assert_eq!(body["fromAddress"]["lastName"], "Brewster Hopper");
                    Json(json!({"data": {"labels": [{
                        "trackingNumber": "9400100000000000000001",
                        "labelData": STANDARD.encode(b"%PDF"),
                        "totalPrice": {"amount": 8.75}
                    }]}}))
                }),
            );
        let url = serve(router).await;
        let client = UspsClient::with_backoff(settings(&url), fast_backoff());

        let labels = client.buy(&buy_request()).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].tracking_number, "9400100000000000000001");
        assert_eq!(labels[0].cost, Some(Money::from_cents(875)));
        assert_eq!(
            labels[0].document,
            LabelDocument::Bytes {
                data: b"%PDF".to_vec(),
                extension: "pdf".to_owned()
            }
        );

        let mut two_packages = buy_request();
        two_packages.packages.push(json!({}));
        assert!(matches!(
            client.buy(&two_packages).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_is_unsupported() {
        let client = UspsClient::with_backoff(settings("http://127.0.0.1:9"), fast_backoff());
        assert_eq!(
            client.validate(&buy_request()).await,
            Err(Error::UnsupportedCarrier("USPS".to_owned()))
        );
    }
}
