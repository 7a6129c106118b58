// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::uuid_at;

use super::money::{DecimalText, Money};

text_enum! {
    PaymentStatus {
        Initiated => "initiated",
        Success => "success",
        Failure => "failure",
    }
}

/// Stripe payment intent tracked until it succeeds or fails.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub intent_id: String,
    pub amount: Money,
    pub status: PaymentStatus,
}

impl Payment {
    pub const COLUMNS: &'static str = "id, user_id, intent_id, amount_cents, status";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            user_id: uuid_at(row, 1)?,
            intent_id: row.get(2)?,
            amount: Money::from_cents(row.get(3)?),
            status: row.get(4)?,
        })
    }
}

/// Body of `POST /payments/create-payment-intent`. The amount is kept as
/// text so that it can be truncated to cents.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount: DecimalText,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}
