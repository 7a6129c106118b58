// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{json_at, opt_time_at, time_at, uuid_at};

use super::inventory::InventoryView;
use super::product::ProductBrief;
use super::user::UserBrief;

text_enum! {
    FulfillmentStatus {
        Pending => "pending",
        Fulfilled => "fulfilled",
        Cancelled => "cancelled",
    }
}

/// Stored fulfillment request, without its items.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentRequest {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub holder_id: Uuid,
    pub status: FulfillmentStatus,
    pub created_at: DateTime<Utc>,
}

impl FulfillmentRequest {
    pub const COLUMNS: &'static str = "id, owner_id, holder_id, status, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            owner_id: uuid_at(row, 1)?,
            holder_id: uuid_at(row, 2)?,
            status: row.get(3)?,
            created_at: time_at(row, 4)?,
        })
    }
}

/// Stored item of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentItem {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub quantity: i64,
    /// Ids of the labels shipped with this item.
    pub label_urls: Vec<String>,
}

impl FulfillmentItem {
    pub const COLUMNS: &'static str = "id, inventory_id, quantity, label_urls";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            inventory_id: uuid_at(row, 1)?,
            quantity: row.get(2)?,
            label_urls: json_at(row, 3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentInventory {
    pub id: Uuid,
    pub product: ProductBrief,
    pub holder: UserBrief,
    pub owner: UserBrief,
}

impl From<InventoryView> for FulfillmentInventory {
    fn from(view: InventoryView) -> Self {
        Self {
            id: view.id,
            product: view.product,
            holder: view.holder,
            owner: view.owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentItemView {
    pub id: Uuid,
    pub quantity: i64,
    pub label_urls: Vec<String>,
    pub note: Option<String>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub inventory: FulfillmentInventory,
}

impl FulfillmentItemView {
    pub fn columns() -> String {
        format!(
            "f.request_id, f.id, f.quantity, f.label_urls, f.note, f.fulfilled_at, {}",
            InventoryView::COLUMNS
        )
    }

    pub const FROM: &'static str = "fulfillment_items f \
         JOIN inventories i ON i.id = f.inventory_id \
         JOIN products p ON p.id = i.product_id \
         JOIN users h ON h.id = i.holder_id \
         JOIN users o ON o.id = i.owner_id";

    /// Read an item and the id of its request.
    pub fn from_row(row: &Row) -> rusqlite::Result<(String, Self)> {
        let request_id: String = row.get(0)?;
        let item = Self {
            id: uuid_at(row, 1)?,
            quantity: row.get(2)?,
            label_urls: json_at(row, 3)?,
            note: row.get(4)?,
            fulfilled_at: opt_time_at(row, 5)?,
            inventory: InventoryView::from_row_at(row, 6)?.into(),
        };
        Ok((request_id, item))
    }
}

/// Request with its items, as listed to owners and holders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentRequestView {
    pub id: Uuid,
    pub status: FulfillmentStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<FulfillmentItemView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentItemCreate {
    pub inventory_id: Uuid,
    pub quantity: i64,
    #[serde(default)]
    pub label_urls: Vec<String>,
}

/// Body of `POST /fulfillments/requests`.
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentRequestCreate {
    pub items: Vec<FulfillmentItemCreate>,
}

/// Filters of the request listings. `status` defaults to pending.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FulfillmentFilters {
    pub status: Option<FulfillmentStatus>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Optional body of `POST /fulfillments/requests/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmFulfillRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentCreated {
    pub request_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentOutcome {
    pub request_id: Uuid,
    pub status: FulfillmentStatus,
}
