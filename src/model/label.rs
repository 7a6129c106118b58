// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Shipping labels.
//!
//! Stored labels and the bodies of the quote, purchase and cancel operations.
//!

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::{time_at, uuid_at};

use super::money::Money;

text_enum! {
    /// Carrier that issued a label.
    Carrier {
        FedEx => "FedEx",
        Ups => "UPS",
        Usps => "USPS",
        Other => "Other",
    }
}

text_enum! {
    LabelStatus {
        New => "new",
        Shipped => "shipped",
        Cancelled => "cancelled",
    }
}

/// Purchased (or uploaded) label. `label_url` is the storage key of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub status: LabelStatus,
    pub order_number: Option<String>,
    pub tracking_number: String,
    pub label_url: String,
    pub carrier: Carrier,
    pub service_type: String,
    pub cost_estimate: Money,
    pub cost_actual: Option<Money>,
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Label {
    pub const COLUMNS: &'static str = "id, user_id, status, order_number, tracking_number, \
         label_url, carrier, service_type, cost_estimate_cents, cost_actual_cents, invoice_id, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let cost_actual: Option<i64> = row.get(9)?;
        Ok(Self {
            id: uuid_at(row, 0)?,
            user_id: uuid_at(row, 1)?,
            status: row.get(2)?,
            order_number: row.get(3)?,
            tracking_number: row.get(4)?,
            label_url: row.get(5)?,
            carrier: row.get(6)?,
            service_type: row.get(7)?,
            cost_estimate: Money::from_cents(row.get(8)?),
            cost_actual: cost_actual.map(Money::from_cents),
            invoice_id: row.get(10)?,
            created_at: time_at(row, 11)?,
        })
    }
}

/// Shipper or recipient of a shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSchema {
    pub contact_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub street_line1: String,
    #[serde(default)]
    pub street_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country_code: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /labels/{carrier}/rates` and `/validate`.
///
/// Packages are passed through to the carrier in its own format
/// (`weight.value`, `dimensions.{length,width,height}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatesRequest {
    pub order_number: String,
    #[serde(default)]
    pub service_type: Option<String>,
    pub shipper: AddressSchema,
    pub recipient: AddressSchema,
    pub packages: Vec<Value>,
}

/// Body of `POST /labels/{carrier}/buy-label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyLabelRequest {
    #[serde(default)]
    pub order_number: Option<String>,
    pub service_type: String,
    #[serde(default)]
    pub pickup_type: Option<String>,
    #[serde(default)]
    pub total_weight: Option<f64>,
    #[serde(default)]
    pub ship_date: Option<String>,
    #[serde(default)]
    pub label_stock_type: Option<String>,
    #[serde(default)]
    pub merge_label_doc_option: Option<String>,
    pub shipper: AddressSchema,
    pub recipient: AddressSchema,
    pub packages: Vec<Value>,
    pub signature_option: String,
}

impl BuyLabelRequest {
    /// The quote request matching this purchase.
    pub fn rates_request(&self) -> RatesRequest {
        RatesRequest {
            order_number: self.order_number.clone().unwrap_or_default(),
            service_type: Some(self.service_type.clone()),
            shipper: self.shipper.clone(),
            recipient: self.recipient.clone(),
            packages: self.packages.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelLabelRequest {
    pub tracking_number: String,
}

/// A carrier quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRate {
    pub service_provider: String,
    pub service_type: String,
    pub total_charge: Money,
    pub delivery_promise: String,
}

/// A label document bought from a carrier, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchasedLabel {
    pub tracking_number: String,
    pub document: LabelDocument,
    /// Price charged by the carrier, when reported.
    pub cost: Option<Money>,
}

/// Where the bytes of a purchased label come from.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelDocument {
    /// Download URL returned by the carrier.
    Url(String),
    /// Inline document and its file extension.
    Bytes { data: Vec<u8>, extension: String },
}

/// Result of a package validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub error: Option<String>,
}

/// Signed download link of a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelUrl {
    pub id: Uuid,
    pub tracking_number: String,
    pub url: String,
}

/// Filters of `GET /labels`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelFilters {
    pub status: Option<LabelStatus>,
    pub carrier: Option<Carrier>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// A file received by `POST /labels/upload`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelUploadResponse {
    pub label_ids: Vec<Uuid>,
}
