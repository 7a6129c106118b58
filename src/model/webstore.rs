// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::database::{time_at, uuid_at};

text_enum! {
    StoreType {
        Amazon => "amazon",
        Walmart => "walmart",
    }
}

/// Connected online store. `auth_config` holds the marketplace credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webstore {
    pub id: Uuid,
    pub store_type: StoreType,
    pub name: String,
    pub store_id: String,
    pub auth_config: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Webstore {
    pub const COLUMNS: &'static str = "id, store_type, name, store_id, auth_config, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let auth_config: Option<String> = row.get(4)?;
        Ok(Self {
            id: uuid_at(row, 0)?,
            store_type: row.get(1)?,
            name: row.get(2)?,
            store_id: row.get(3)?,
            auth_config: auth_config
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_default(),
            created_at: time_at(row, 5)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebstoreCreate {
    pub store_type: StoreType,
    pub name: String,
    pub store_id: String,
    #[serde(default)]
    pub auth_config: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebstoreUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_config: Option<Map<String, Value>>,
}
