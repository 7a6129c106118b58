// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::uuid_at;

/// Catalog product, identified by its UPC-A code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub upc: String,
    pub description: Option<String>,
}

impl Product {
    pub const COLUMNS: &'static str = "id, name, upc, description";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            upc: row.get(2)?,
            description: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductBrief {
    pub id: Uuid,
    pub name: String,
    pub upc: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddProductRequest {
    pub name: String,
    pub upc: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Filters of `GET /products`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub q: Option<String>,
    pub upc: Option<String>,
}
