// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Data model for Cargovera.
//!
//! Stored entities and the request/response bodies of the HTTP API.
//!
//! ## Data model
//!
//! * accounts: [`user`], [`address`], [`webstore`]
//! * ledger: [`money`], [`transaction`], [`payment`]
//! * shipping: [`label`], [`order`]
//! * stock: [`product`], [`inventory`], [`fulfillment`]
//!

use std::fmt;

/// Text that does not name any variant of a stored enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Enum stored and serialized by name.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::model::UnknownVariant;

            fn from_str(text: &str) -> Result<Self, Self::Err> {
                match text {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::model::UnknownVariant(
                        format!("{}: {}", stringify!($name), other),
                    )),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }

        impl From<$name> for rusqlite::types::Value {
            fn from(value: $name) -> Self {
                rusqlite::types::Value::Text(value.as_str().to_owned())
            }
        }
    };
}

pub mod address;
pub mod fulfillment;
pub mod inventory;
pub mod label;
pub mod money;
pub mod order;
pub mod pagination;
pub mod payment;
pub mod product;
pub mod transaction;
pub mod user;
pub mod webstore;

pub use money::{Money, Multiplier};
pub use pagination::{PageQuery, Paginated};
