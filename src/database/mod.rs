// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Database module.
//!
//! SQLite storage. Ids are stored as UUID text, timestamps as RFC 3339 UTC text
//! with microseconds (so that text order is time order), money as integer cents.
//!

pub mod migrations;
pub mod query;
pub mod sqlite;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{types::Type, Row};
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub use query::{date_range, day_range, Filter, Listing};
pub use sqlite::Database;

pub fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    to_db_time(&Utc::now())
}

pub fn parse_time(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc))
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Read a timestamp column.
pub fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_time(&text).map_err(|e| conversion_error(idx, e))
}

/// Read a nullable timestamp column.
pub fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_time(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e))
}

/// Read a JSON text column.
pub fn json_at<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}
