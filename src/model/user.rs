// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Users.
//!

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{conversion_error, time_at, uuid_at};

use super::money::{DecimalText, Money, Multiplier};

text_enum! {
    /// Role carried in access tokens.
    Role {
        Admin => "admin",
        User => "user",
    }
}

/// Stored account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub is_email_verified: bool,
    pub is_admin: bool,
    pub is_active: bool,
    pub multiplier: Multiplier,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub const COLUMNS: &'static str = "id, name, email, phone, password_hash, is_email_verified, \
         is_admin, is_active, multiplier, balance_cents, created_at, updated_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let multiplier: i64 = row.get(8)?;
        Ok(Self {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            password_hash: row.get(4)?,
            is_email_verified: row.get(5)?,
            is_admin: row.get(6)?,
            is_active: row.get(7)?,
            multiplier: Multiplier::from_hundredths(multiplier)
                .map_err(|e| conversion_error(8, e))?,
            balance: Money::from_cents(row.get(9)?),
            created_at: time_at(row, 10)?,
            updated_at: time_at(row, 11)?,
        })
    }

    pub fn role(&self) -> Role {
        if self.is_admin {
            Role::Admin
        } else {
            Role::User
        }
    }
}

/// Account as shown to its owner and to administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMe {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub multiplier: Multiplier,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserMe {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            is_admin: user.is_admin,
            is_active: user.is_active,
            is_email_verified: user.is_email_verified,
            multiplier: user.multiplier,
            balance: user.balance,
            created_at: user.created_at,
        }
    }
}

/// Short form embedded in inventories and fulfillment requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBrief {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// Search result of `GET /users/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRegister {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserLogin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Filters of `GET /admin/users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUserFilters {
    pub is_active: Option<bool>,
    /// Substring of the e-mail.
    pub email: Option<String>,
}

/// Body of `POST /admin/{user_id}/multiplier`, parsed by the service so that
/// out of range values get a readable message.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiplierRequest {
    pub multiplier: DecimalText,
}

/// Body of `POST /admin/{user_id}/topup`. Negative amounts take money out.
#[derive(Debug, Clone, Deserialize)]
pub struct TopupRequest {
    pub amount: DecimalText,
    #[serde(default)]
    pub note: Option<String>,
}
