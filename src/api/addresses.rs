// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{new_id, now, Filter, Listing};
use crate::error::Error;
use crate::model::address::{Address, AddressInput};
use crate::model::pagination::{PageQuery, Paginated};

use super::CargoveraApi;

fn address_not_found() -> Error {
    Error::NotFound("Address not found".to_owned())
}

fn address_of(conn: &Connection, user_id: &str, id: &str) -> Result<Address, Error> {
    conn.query_row(
        &format!(
            "SELECT {} FROM addresses WHERE id = ?1 AND user_id = ?2",
            Address::COLUMNS
        ),
        params![id, user_id],
        Address::from_row,
    )
    .optional()?
    .ok_or_else(address_not_found)
}

/// A new default address replaces the previous one.
fn clear_default(conn: &Connection, user_id: &str, input: &AddressInput) -> Result<(), Error> {
    if input.is_default {
        conn.execute(
            "UPDATE addresses SET is_default = 0 WHERE user_id = ?1",
            params![user_id],
        )?;
    }
    Ok(())
}

impl CargoveraApi {
    pub fn list_addresses(
        &self,
        user_id: &str,
        page: &PageQuery,
    ) -> Result<Paginated<Address>, Error> {
        let listing = Listing {
            columns: Address::COLUMNS,
            from: "addresses",
            id_column: "id",
            created_column: "created_at",
            filters: vec![Filter::eq("user_id", user_id.to_owned())],
            base_path: "/addresses",
        };
        self.db
            .call(|conn| listing.paginate(conn, page, Address::from_row))
    }

    pub fn create_address(&self, user_id: &str, input: AddressInput) -> Result<Address, Error> {
        let id = new_id();
        let address = self.db.transaction(|conn| {
            clear_default(conn, user_id, &input)?;
            let now = now();
            conn.execute(
                "INSERT INTO addresses (id, user_id, alias, company_name, contact_name, phone, \
                 street_line1, street_line2, city, state, zip_code, country, is_default, \
                 created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    id,
                    user_id,
                    input.alias,
                    input.company_name,
                    input.contact_name,
                    input.phone,
                    input.street_line1,
                    input.street_line2,
                    input.city,
                    input.state,
                    input.zip_code,
                    input.country,
                    input.is_default,
                    now
                ],
            )?;
            address_of(conn, user_id, &id)
        })?;
        log::info!("Address {} created for user {}", id, user_id);
        Ok(address)
    }

    /// # Errors
    ///
    /// * `Error::NotFound` - "Address not found", also for addresses of other users
    ///
    pub fn update_address(
        &self,
        user_id: &str,
        id: &str,
        input: AddressInput,
    ) -> Result<Address, Error> {
        self.db.transaction(|conn| {
            address_of(conn, user_id, id)?;
            clear_default(conn, user_id, &input)?;
            conn.execute(
                "UPDATE addresses SET alias = ?3, company_name = ?4, contact_name = ?5, phone = ?6, \
                 street_line1 = ?7, street_line2 = ?8, city = ?9, state = ?10, zip_code = ?11, \
                 country = ?12, is_default = ?13, updated_at = ?14 WHERE id = ?1 AND user_id = ?2",
                params![
                    id,
                    user_id,
                    input.alias,
                    input.company_name,
                    input.contact_name,
                    input.phone,
                    input.street_line1,
                    input.street_line2,
                    input.city,
                    input.state,
                    input.zip_code,
                    input.country,
                    input.is_default,
                    now()
                ],
            )?;
            address_of(conn, user_id, id)
        })
    }

    pub fn delete_address(&self, user_id: &str, id: &str) -> Result<(), Error> {
        let deleted = self.db.call(|conn| {
            Ok(conn.execute(
                "DELETE FROM addresses WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?)
        })?;
        if deleted == 0 {
            return Err(address_not_found());
        }
        log::info!("Address {} deleted", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn input(alias: &str, is_default: bool) -> AddressInput {
        AddressInput {
            alias: alias.to_owned(),
            company_name: None,
            contact_name: "Ada Lovelace".to_owned(),
            phone: "5551234567".to_owned(),
            street_line1: "1 Main St".to_owned(),
            street_line2: None,
            city: "Springfield".to_owned(),
            state: "IL".to_owned(),
            zip_code: "62701".to_owned(),
            country: "US".to_owned(),
            is_default,
        }
    }

    #[test]
    fn test_address_crud() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 0).id.to_string();
        let bob = create_user(&t.api, "bob@example.com", false, 0).id.to_string();

        let home = t.api.create_address(&ada, input("home", true)).unwrap();
        let work = t.api.create_address(&ada, input("work", true)).unwrap();
        let page = t.api.list_addresses(&ada, &PageQuery::default()).unwrap();
        assert_eq!(page.data.len(), 2);
        let home_now = page.data.iter().find(|a| a.id == home.id).unwrap();
        assert!(!home_now.is_default);
        assert!(page.data.iter().any(|a| a.id == work.id && a.is_default));

        let home_id = home.id.to_string();
        let updated = t
            .api
            .update_address(&ada, &home_id, input("house", false))
            .unwrap();
        assert_eq!(updated.alias, "house");
        assert_eq!(
            t.api.update_address(&bob, &home_id, input("x", false)),
            Err(Error::NotFound("Address not found".to_owned()))
        );
        assert_eq!(
            t.api.delete_address(&bob, &home_id),
            Err(Error::NotFound("Address not found".to_owned()))
        );
        t.api.delete_address(&ada, &home_id).unwrap();
        assert_eq!(
            t.api.list_addresses(&ada, &PageQuery::default()).unwrap().data.len(),
            1
        );
    }
}
