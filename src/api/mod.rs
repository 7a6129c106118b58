// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//!
//! # API
//!
//! This module contains the Cargovera API: every business operation of the
//! service, independent of the HTTP layer. Operations are grouped by resource
//! in the submodules, all implemented on [`CargoveraApi`].

mod addresses;
mod admin;
mod auth;
mod fulfillments;
mod inventories;
mod labels;
mod orders;
mod payments;
mod products;
mod transactions;
mod users;
mod webstores;

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};

use crate::carriers::{Carriers, FedExClient, UspsClient};
use crate::database::Database;
use crate::error::Error;
use crate::mail::{build_mailer, Mailer};
use crate::model::user::User;
use crate::prometheus::Metrics;
use crate::security::TokenService;
use crate::settings::CargoveraSettings;
use crate::storage::LabelStore;
use crate::stripe::{PaymentGateway, StripeClient};

pub use auth::LoginOutcome;
pub use inventories::StockRole;
pub use labels::{MAX_UPLOAD_FILES, MAX_UPLOAD_MB};

/// Cargovera API.
#[derive(Clone)]
pub struct CargoveraApi {
    pub(crate) settings: Arc<CargoveraSettings>,
    pub(crate) db: Database,
    pub(crate) tokens: TokenService,
    pub(crate) mailer: Arc<dyn Mailer>,
    pub(crate) carriers: Carriers,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) store: LabelStore,
    pub(crate) metrics: Metrics,
}

/// External services used by the API.
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub carriers: Carriers,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl CargoveraApi {
    /// Build the API with the given external services.
    pub fn new(settings: CargoveraSettings, db: Database, services: Services) -> Self {
        let tokens = TokenService::new(&settings);
        let store = LabelStore::new(
            settings.labels.dir.clone(),
            &settings.server.public_url,
            tokens.clone(),
        );
        Self {
            settings: Arc::new(settings),
            db,
            tokens,
            mailer: services.mailer,
            carriers: services.carriers,
            gateway: services.gateway,
            store,
            metrics: Metrics::new(),
        }
    }

    /// Build the API from settings: open the database and create the carrier,
    /// payment and mail clients.
    ///
    /// # Errors
    ///
    /// * `Error::Database` - the database cannot be opened or migrated
    /// * `Error::Config` - invalid mail settings
    ///
    pub fn build(settings: CargoveraSettings) -> Result<Self, Error> {
        let db = Database::open(&settings.database.path)?;
        let services = Services {
            mailer: build_mailer(&settings.mail)?,
            carriers: Carriers::new(
                Arc::new(FedExClient::new(
                    settings.fedex.clone(),
                    &settings.default_contact_phone,
                )),
                Arc::new(UspsClient::new(settings.usps.clone())),
            ),
            gateway: Arc::new(StripeClient::new(&settings.stripe)),
        };
        Ok(Self::new(settings, db, services))
    }

    pub fn settings(&self) -> &CargoveraSettings {
        &self.settings
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - "User not found"
    ///
    pub fn user(&self, user_id: &str) -> Result<User, Error> {
        self.db.call(|conn| user_by_id(conn, user_id))
    }
}

fn user_not_found() -> Error {
    Error::NotFound("User not found".to_owned())
}

pub(crate) fn user_by_id(conn: &Connection, user_id: &str) -> Result<User, Error> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
        params![user_id],
        User::from_row,
    )
    .optional()?
    .ok_or_else(user_not_found)
}

pub(crate) fn user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, Error> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", User::COLUMNS),
            params![email],
            User::from_row,
        )
        .optional()?)
}
