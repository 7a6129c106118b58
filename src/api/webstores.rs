// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::database::{new_id, now};
use crate::error::Error;
use crate::model::webstore::{Webstore, WebstoreCreate, WebstoreUpdate};

use super::CargoveraApi;

fn webstore_of(conn: &Connection, user_id: &str, id: &str) -> Result<Webstore, Error> {
    conn.query_row(
        &format!(
            "SELECT {} FROM webstores WHERE id = ?1 AND user_id = ?2",
            Webstore::COLUMNS
        ),
        params![id, user_id],
        Webstore::from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound("Webstore not found".to_owned()))
}

impl CargoveraApi {
    pub fn list_webstores(&self, user_id: &str) -> Result<Vec<Webstore>, Error> {
        self.db.call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM webstores WHERE user_id = ?1 ORDER BY created_at DESC",
                Webstore::COLUMNS
            ))?;
            let stores = stmt
                .query_map(params![user_id], Webstore::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(stores)
        })
    }

    pub fn create_webstore(&self, user_id: &str, input: WebstoreCreate) -> Result<Webstore, Error> {
        if input.name.trim().is_empty() || input.store_id.trim().is_empty() {
            return Err(Error::BadRequest("name and store_id are required".to_owned()));
        }
        let id = new_id();
        let auth_config = serde_json::to_string(&Value::Object(input.auth_config))?;
        let store = self.db.transaction(|conn| {
            let now = now();
            conn.execute(
                "INSERT INTO webstores (id, user_id, store_type, name, store_id, auth_config, \
                 created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id,
                    user_id,
                    input.store_type,
                    input.name.trim(),
                    input.store_id.trim(),
                    auth_config,
                    now
                ],
            )?;
            webstore_of(conn, user_id, &id)
        })?;
        log::info!("Webstore {} ({}) added for user {}", id, store.store_type, user_id);
        Ok(store)
    }

    pub fn update_webstore(
        &self,
        user_id: &str,
        id: &str,
        update: WebstoreUpdate,
    ) -> Result<Webstore, Error> {
        let auth_config = update
            .auth_config
            .map(|config| serde_json::to_string(&Value::Object(config)))
            .transpose()?;
        let name = update.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        self.db.transaction(|conn| {
            webstore_of(conn, user_id, id)?;
            conn.execute(
                "UPDATE webstores SET name = COALESCE(?3, name), \
                 auth_config = COALESCE(?4, auth_config), updated_at = ?5 \
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id, name, auth_config, now()],
            )?;
            webstore_of(conn, user_id, id)
        })
    }

    pub fn delete_webstore(&self, user_id: &str, id: &str) -> Result<(), Error> {
        self.db.transaction(|conn| {
            webstore_of(conn, user_id, id)?;
            conn.execute(
                "DELETE FROM webstores WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(())
        })?;
        log::info!("Webstore {} deleted", id);
        Ok(())
    }
}
