// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Pagination.
//!
//! Offset pagination (`page`, `limit`) and keyset pagination (`cursor`) share the
//! same response envelope.
//!

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_LIMIT: u32 = 20;
pub const MIN_LIMIT: u32 = 2;
pub const MAX_LIMIT: u32 = 100;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Pagination query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl PageQuery {
    /// Page size, checked against the allowed range.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - limit outside 2..=100 or page 0
    ///
    pub fn checked_limit(&self) -> Result<u32, Error> {
        if let Some(0) = self.page {
            return Err(Error::BadRequest("page must be greater than 0".to_owned()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            return Err(Error::BadRequest(format!(
                "limit must be between {} and {}",
                MIN_LIMIT, MAX_LIMIT
            )));
        }
        Ok(limit)
    }
}

/// Pagination state of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub total_items: Option<u64>,
    pub items_per_page: u32,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_cursor: Option<String>,
    pub previous_cursor: Option<String>,
}

/// Navigation links of a response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaginationLinks {
    pub first: Option<String>,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
    pub links: Option<PaginationLinks>,
}

impl<T> Paginated<T> {
    /// Convert every item, keeping the pagination state.
    pub fn try_map<U, F>(self, f: F) -> Result<Paginated<U>, Error>
    where
        F: FnMut(T) -> Result<U, Error>,
    {
        Ok(Paginated {
            data: self.data.into_iter().map(f).collect::<Result<Vec<_>, _>>()?,
            pagination: self.pagination,
            links: self.links,
        })
    }
}

/// Position of the last item of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub sort_field: Option<String>,
    pub sort_value: Option<serde_json::Value>,
}

impl Cursor {
    pub fn encode(&self) -> Result<String, Error> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Decode a cursor received from a client.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - "Invalid cursor format"
    ///
    pub fn decode(cursor: &str) -> Result<Self, Error> {
        let invalid = || Error::BadRequest("Invalid cursor format".to_owned());
        let bytes = STANDARD.decode(cursor.as_bytes()).map_err(|_| invalid())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid())
    }
}
