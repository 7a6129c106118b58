// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::{conversion_error, json_at, time_at, uuid_at};

use super::money::Money;

text_enum! {
    OrderStatus {
        New => "new",
        Shipped => "shipped",
        Others => "others",
    }
}

/// Marketplace order of a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub store_name: String,
    pub item_name: String,
    pub item_sku: String,
    pub item_qty: i64,
    pub status: OrderStatus,
    pub order_date: NaiveDate,
    pub ship_by: Option<NaiveDate>,
    pub deliver_by: Option<NaiveDate>,
    pub total_amount: Money,
    pub delivery_notes: Option<String>,
    /// Snapshot of the buyer's shipping address.
    pub buyer_address: Value,
    pub created_at: DateTime<Utc>,
}

fn day_at(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        NaiveDate::parse_from_str(&t, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

impl Order {
    pub const COLUMNS: &'static str = "id, order_number, store_name, item_name, item_sku, item_qty, \
         status, order_date, ship_by, deliver_by, total_amount_cents, delivery_notes, buyer_address, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let order_date = day_at(row, 7)?.ok_or(rusqlite::Error::InvalidColumnType(
            7,
            "order_date".to_owned(),
            rusqlite::types::Type::Null,
        ))?;
        Ok(Self {
            id: uuid_at(row, 0)?,
            order_number: row.get(1)?,
            store_name: row.get(2)?,
            item_name: row.get(3)?,
            item_sku: row.get(4)?,
            item_qty: row.get(5)?,
            status: row.get(6)?,
            order_date,
            ship_by: day_at(row, 8)?,
            deliver_by: day_at(row, 9)?,
            total_amount: Money::from_cents(row.get(10)?),
            delivery_notes: row.get(11)?,
            buyer_address: json_at(row, 12)?,
            created_at: time_at(row, 13)?,
        })
    }
}

/// Order as imported by `POST /orders/bulk`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInput {
    pub order_number: String,
    pub store_name: String,
    pub item_name: String,
    pub item_sku: String,
    pub item_qty: i64,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    /// Defaults to the import day.
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub ship_by: Option<NaiveDate>,
    #[serde(default)]
    pub deliver_by: Option<NaiveDate>,
    pub total_amount: Money,
    #[serde(default)]
    pub delivery_notes: Option<String>,
    pub buyer_address: Value,
}

/// Filters of `GET /orders`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    pub order_number: Option<String>,
    pub store_name: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
}
