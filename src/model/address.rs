// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{time_at, uuid_at};

/// Saved address of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub alias: String,
    pub company_name: Option<String>,
    pub contact_name: String,
    pub phone: String,
    pub street_line1: String,
    pub street_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    pub const COLUMNS: &'static str = "id, alias, company_name, contact_name, phone, street_line1, \
         street_line2, city, state, zip_code, country, is_default, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            alias: row.get(1)?,
            company_name: row.get(2)?,
            contact_name: row.get(3)?,
            phone: row.get(4)?,
            street_line1: row.get(5)?,
            street_line2: row.get(6)?,
            city: row.get(7)?,
            state: row.get(8)?,
            zip_code: row.get(9)?,
            country: row.get(10)?,
            is_default: row.get(11)?,
            created_at: time_at(row, 12)?,
        })
    }
}

/// Body of address create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub alias: String,
    #[serde(default)]
    pub company_name: Option<String>,
    pub contact_name: String,
    pub phone: String,
    pub street_line1: String,
    #[serde(default)]
    pub street_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}
