// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Inventories.
//!
//! Stock of a product held by one user on behalf of an owner, and the log of
//! its movements.
//!

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{new_id, now, time_at, uuid_at};

use super::product::ProductBrief;
use super::user::UserBrief;

text_enum! {
    InventoryStatus {
        Active => "active",
        Inactive => "inactive",
        SoftDeleted => "soft_deleted",
    }
}

text_enum! {
    InventoryTransactionType {
        Credit => "credit",
        Debit => "debit",
    }
}

text_enum! {
    /// What caused an inventory movement.
    InventoryTransactionSource {
        Creation => "creation",
        Outbound => "outbound",
        Transfer => "transfer",
        Adjustment => "adjustment",
        Deletion => "deletion",
    }
}

/// Stored inventory row.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub id: Uuid,
    pub product_id: Uuid,
    pub holder_id: Uuid,
    pub owner_id: Uuid,
    pub available_qty: i64,
    pub reserved_qty: i64,
    pub location: String,
    pub status: InventoryStatus,
}

impl Inventory {
    pub const COLUMNS: &'static str =
        "id, product_id, holder_id, owner_id, available_qty, reserved_qty, location, status";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            product_id: uuid_at(row, 1)?,
            holder_id: uuid_at(row, 2)?,
            owner_id: uuid_at(row, 3)?,
            available_qty: row.get(4)?,
            reserved_qty: row.get(5)?,
            location: row.get(6)?,
            status: row.get(7)?,
        })
    }
}

/// Inventory joined with its product, holder and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryView {
    pub id: Uuid,
    pub product: ProductBrief,
    pub available_qty: i64,
    pub reserved_qty: i64,
    pub holder: UserBrief,
    pub owner: UserBrief,
    pub location: String,
}

impl InventoryView {
    /// Columns of [`InventoryView::FROM`], read by [`InventoryView::from_row_at`].
    pub const COLUMNS: &'static str = "i.id, i.available_qty, i.reserved_qty, i.location, \
         p.id, p.name, p.upc, h.id, h.email, h.name, o.id, o.email, o.name";
    pub const WIDTH: usize = 13;
    pub const FROM: &'static str = "inventories i \
         JOIN products p ON p.id = i.product_id \
         JOIN users h ON h.id = i.holder_id \
         JOIN users o ON o.id = i.owner_id";

    pub fn from_row_at(row: &Row, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, at)?,
            available_qty: row.get(at + 1)?,
            reserved_qty: row.get(at + 2)?,
            location: row.get(at + 3)?,
            product: ProductBrief {
                id: uuid_at(row, at + 4)?,
                name: row.get(at + 5)?,
                upc: row.get(at + 6)?,
            },
            holder: UserBrief {
                id: uuid_at(row, at + 7)?,
                email: row.get(at + 8)?,
                name: row.get(at + 9)?,
            },
            owner: UserBrief {
                id: uuid_at(row, at + 10)?,
                email: row.get(at + 11)?,
                name: row.get(at + 12)?,
            },
        })
    }

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Self::from_row_at(row, 0)
    }
}

/// Inventory movement joined with its inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryTransactionView {
    pub id: Uuid,
    pub inventory: InventoryView,
    pub transaction_type: InventoryTransactionType,
    pub quantity: i64,
    pub source: InventoryTransactionSource,
    pub source_ref_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransactionView {
    pub const FROM: &'static str = "inventory_transactions t \
         JOIN inventories i ON i.id = t.inventory_id \
         JOIN products p ON p.id = i.product_id \
         JOIN users h ON h.id = i.holder_id \
         JOIN users o ON o.id = i.owner_id";

    pub fn columns() -> String {
        format!(
            "t.id, t.transaction_type, t.quantity, t.source, t.source_ref_id, t.note, t.created_at, {}",
            InventoryView::COLUMNS
        )
    }

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            transaction_type: row.get(1)?,
            quantity: row.get(2)?,
            source: row.get(3)?,
            source_ref_id: row.get(4)?,
            note: row.get(5)?,
            created_at: time_at(row, 6)?,
            inventory: InventoryView::from_row_at(row, 7)?,
        })
    }
}

/// A movement to record in the inventory log.
#[derive(Debug, Clone)]
pub struct InventoryMovement<'a> {
    pub inventory_id: &'a str,
    pub product_id: &'a str,
    pub created_by: &'a str,
    pub transaction_type: InventoryTransactionType,
    pub quantity: i64,
    pub source: InventoryTransactionSource,
    pub source_ref_id: Option<&'a str>,
    pub note: &'a str,
}

impl InventoryMovement<'_> {
    pub fn insert(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO inventory_transactions (id, inventory_id, product_id, created_by, \
             transaction_type, quantity, source, source_ref_id, note, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new_id(),
                self.inventory_id,
                self.product_id,
                self.created_by,
                self.transaction_type,
                self.quantity,
                self.source,
                self.source_ref_id,
                self.note,
                now()
            ],
        )?;
        Ok(())
    }
}

/// Body of `POST /inventories`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddInventoryRequest {
    pub product_id: Uuid,
    pub available_qty: i64,
    pub holder_id: Uuid,
    pub owner_id: Uuid,
    pub location: String,
}

/// Query of the inventory listings, `q` searches the product name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventorySearch {
    pub q: Option<String>,
}
