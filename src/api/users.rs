// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::params;

use crate::database::{now, uuid_at, Filter, Listing};
use crate::error::Error;
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::user::{UserMe, UserSummary, UserUpdate};

use super::{user_by_id, CargoveraApi};

const MAX_NAME_LEN: usize = 50;
const MAX_PHONE_LEN: usize = 20;

impl CargoveraApi {
    /// Update the caller's name and phone. Blank values are ignored.
    pub fn update_profile(&self, user_id: &str, update: UserUpdate) -> Result<UserMe, Error> {
        let name = update.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let phone = update.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        if name.is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
            return Err(Error::BadRequest(format!(
                "name must have at most {} characters",
                MAX_NAME_LEN
            )));
        }
        if phone.is_some_and(|p| p.chars().count() > MAX_PHONE_LEN) {
            return Err(Error::BadRequest(format!(
                "phone must have at most {} characters",
                MAX_PHONE_LEN
            )));
        }
        let user = self.db.transaction(|conn| {
            user_by_id(conn, user_id)?;
            conn.execute(
                "UPDATE users SET name = COALESCE(?2, name), phone = COALESCE(?3, phone), \
                 updated_at = ?4 WHERE id = ?1",
                params![user_id, name, phone, now()],
            )?;
            user_by_id(conn, user_id)
        })?;
        log::info!("Profile of user {} updated", user_id);
        Ok(UserMe::from(&user))
    }

    /// Search users by name or e-mail.
    pub fn search_users(
        &self,
        q: Option<&str>,
        page: &PageQuery,
    ) -> Result<Paginated<UserSummary>, Error> {
        let listing = Listing {
            columns: "id, name, email",
            from: "users",
            id_column: "id",
            created_column: "created_at",
            filters: vec![Filter::search(&["name", "email"], q.unwrap_or_default())],
            base_path: "/users/search",
        };
        self.db.call(|conn| {
            listing.paginate(conn, page, |row| {
                Ok(UserSummary {
                    id: uuid_at(row, 0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn test_update_profile() {
        let t = test_api();
        let user = create_user(&t.api, "ada@example.com", false, 0);
        let id = user.id.to_string();
        let me = t
            .api
            .update_profile(
                &id,
                UserUpdate {
                    name: Some("  Ada Lovelace ".to_owned()),
                    phone: Some("".to_owned()),
                },
            )
            .unwrap();
        assert_eq!(me.name, "Ada Lovelace");
        assert_eq!(me.phone, None);

        let too_long = UserUpdate {
            name: Some("x".repeat(51)),
            phone: None,
        };
        assert!(matches!(
            t.api.update_profile(&id, too_long),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            t.api.update_profile("missing", UserUpdate::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_search_users() {
        let t = test_api();
        create_user(&t.api, "ada@example.com", false, 0);
        create_user(&t.api, "bob@example.com", false, 0);
        let page = t.api.search_users(Some("ADA"), &PageQuery::default()).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].email, "ada@example.com");
        let all = t.api.search_users(None, &PageQuery::default()).unwrap();
        assert_eq!(all.pagination.total_items, Some(2));
    }
}
