// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{new_id, now, time_at, uuid_at};

use super::money::Money;

text_enum! {
    /// Kind of balance movement.
    TransactionType {
        Deposit => "deposit",
        Usage => "usage",
        Refund => "refund",
        Adjustment => "adjustment",
    }
}

/// Balance movement. `new_balance` is the balance right after the movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Money,
    pub new_balance: Money,
    pub trans_type: TransactionType,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub const COLUMNS: &'static str =
        "id, amount_cents, new_balance_cents, trans_type, note, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            amount: Money::from_cents(row.get(1)?),
            new_balance: Money::from_cents(row.get(2)?),
            trans_type: row.get(3)?,
            note: row.get(4)?,
            created_at: time_at(row, 5)?,
        })
    }

    /// Insert a ledger entry. Callers run this inside the transaction that
    /// moves the balance.
    pub fn insert(
        conn: &Connection,
        user_id: &str,
        amount: Money,
        new_balance: Money,
        trans_type: TransactionType,
        note: &str,
    ) -> rusqlite::Result<String> {
        let id = new_id();
        conn.execute(
            "INSERT INTO transactions (id, user_id, amount_cents, new_balance_cents, trans_type, note, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                user_id,
                amount.cents(),
                new_balance.cents(),
                trans_type,
                note,
                now()
            ],
        )?;
        Ok(id)
    }
}

/// Filters of `GET /transactions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilters {
    pub trans_type: Option<TransactionType>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}
