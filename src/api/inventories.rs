// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inventories held by one user for an owner, and their movement log.

use rusqlite::{params, Connection, OptionalExtension};

use crate::database::{new_id, now, Filter, Listing};
use crate::error::Error;
use crate::model::inventory::{
    AddInventoryRequest, Inventory, InventoryMovement, InventorySearch, InventoryStatus,
    InventoryTransactionSource, InventoryTransactionType, InventoryTransactionView, InventoryView,
};
use crate::model::pagination::{PageQuery, Paginated};
use crate::utils::is_valid_zipcode;

use super::{user_by_id, CargoveraApi};

/// Role of the caller in the inventories and fulfillment requests being listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockRole {
    Owner,
    Holder,
}

impl StockRole {
    fn column(&self) -> &'static str {
        match self {
            StockRole::Owner => "i.owner_id",
            StockRole::Holder => "i.holder_id",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            StockRole::Owner => "owner",
            StockRole::Holder => "holder",
        }
    }
}

fn inventory_not_found() -> Error {
    Error::NotFound("Inventory not found".to_owned())
}

pub(crate) fn inventory_by_id(conn: &Connection, id: &str) -> Result<Option<Inventory>, Error> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM inventories WHERE id = ?1", Inventory::COLUMNS),
            params![id],
            Inventory::from_row,
        )
        .optional()?)
}

fn view_by_id(conn: &Connection, id: &str) -> Result<InventoryView, Error> {
    conn.query_row(
        &format!(
            "SELECT {} FROM {} WHERE i.id = ?1",
            InventoryView::COLUMNS,
            InventoryView::FROM
        ),
        params![id],
        InventoryView::from_row,
    )
    .optional()?
    .ok_or_else(inventory_not_found)
}

impl CargoveraApi {
    /// Add stock. Stock of the same product, holder and owner is merged into
    /// the existing inventory, which becomes active again.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - invalid zip code or quantity, caller neither holder nor owner
    /// * `Error::NotFound` - unknown product or user
    ///
    pub fn add_inventory(
        &self,
        user_id: &str,
        request: &AddInventoryRequest,
    ) -> Result<InventoryView, Error> {
        if !is_valid_zipcode(request.location.trim()) {
            return Err(Error::BadRequest("invalid zip code.".to_owned()));
        }
        let holder_id = request.holder_id.to_string();
        let owner_id = request.owner_id.to_string();
        if user_id != holder_id && user_id != owner_id {
            return Err(Error::BadRequest(
                "user has to be either holder or owner.".to_owned(),
            ));
        }
        if request.available_qty <= 0 {
            return Err(Error::BadRequest("invalid available_qty".to_owned()));
        }
        let product_id = request.product_id.to_string();

        let view = self.db.transaction(|conn| {
            let product: Option<String> = conn
                .query_row(
                    "SELECT id FROM products WHERE id = ?1",
                    params![product_id],
                    |row| row.get(0),
                )
                .optional()?;
            if product.is_none() {
                return Err(Error::NotFound("Product not found".to_owned()));
            }
            user_by_id(conn, &holder_id)?;
            user_by_id(conn, &owner_id)?;

            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM inventories WHERE product_id = ?1 AND holder_id = ?2 \
                         AND owner_id = ?3 AND status != ?4",
                        Inventory::COLUMNS
                    ),
                    params![product_id, holder_id, owner_id, InventoryStatus::SoftDeleted],
                    Inventory::from_row,
                )
                .optional()?;
            let inventory_id = match existing {
                Some(inventory) => {
                    let id = inventory.id.to_string();
                    if inventory.available_qty.checked_add(request.available_qty).is_none() {
                        return Err(Error::BadRequest("invalid available_qty".to_owned()));
                    }
                    conn.execute(
                        "UPDATE inventories SET available_qty = available_qty + ?2, status = ?3, \
                         location = ?4, updated_at = ?5 WHERE id = ?1",
                        params![
                            id,
                            request.available_qty,
                            InventoryStatus::Active,
                            request.location.trim(),
                            now()
                        ],
                    )?;
                    id
                }
                None => {
                    let id = new_id();
                    let now = now();
                    conn.execute(
                        "INSERT INTO inventories (id, product_id, holder_id, owner_id, available_qty, \
                         reserved_qty, location, status, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8)",
                        params![
                            id,
                            product_id,
                            holder_id,
                            owner_id,
                            request.available_qty,
                            request.location.trim(),
                            InventoryStatus::Active,
                            now
                        ],
                    )?;
                    id
                }
            };
            InventoryMovement {
                inventory_id: &inventory_id,
                product_id: &product_id,
                created_by: user_id,
                transaction_type: InventoryTransactionType::Credit,
                quantity: request.available_qty,
                source: InventoryTransactionSource::Creation,
                source_ref_id: None,
                note: "add inventory",
            }
            .insert(conn)?;
            view_by_id(conn, &inventory_id)
        })?;
        log::info!(
            "User {} added {} unit(s) to inventory {}",
            user_id,
            request.available_qty,
            view.id
        );
        Ok(view)
    }

    /// Active inventories of the caller in a role.
    pub fn list_inventories(
        &self,
        user_id: &str,
        role: StockRole,
        search: &InventorySearch,
        page: &PageQuery,
    ) -> Result<Paginated<InventoryView>, Error> {
        let base_path = format!("/inventories/{}", role.path());
        let listing = Listing {
            columns: InventoryView::COLUMNS,
            from: InventoryView::FROM,
            id_column: "i.id",
            created_column: "i.created_at",
            filters: vec![
                Filter::eq(role.column(), user_id.to_owned()),
                Filter::eq("i.status", InventoryStatus::Active),
                Filter::search(&["p.name"], search.q.as_deref().unwrap_or_default()),
            ],
            base_path: &base_path,
        };
        self.db
            .call(|conn| listing.paginate(conn, page, InventoryView::from_row))
    }

    fn list_movements(
        &self,
        filter: Filter,
        base_path: &str,
        page: &PageQuery,
    ) -> Result<Paginated<InventoryTransactionView>, Error> {
        let columns = InventoryTransactionView::columns();
        let listing = Listing {
            columns: &columns,
            from: InventoryTransactionView::FROM,
            id_column: "t.id",
            created_column: "t.created_at",
            filters: vec![filter],
            base_path,
        };
        self.db
            .call(|conn| listing.paginate(conn, page, InventoryTransactionView::from_row))
    }

    /// Movements of one inventory, visible to its holder and owner.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - "Inventory not found"
    /// * `Error::Forbidden` - caller neither holder nor owner
    ///
    pub fn inventory_movements(
        &self,
        user_id: &str,
        inventory_id: &str,
        page: &PageQuery,
    ) -> Result<Paginated<InventoryTransactionView>, Error> {
        let inventory = self
            .db
            .call(|conn| inventory_by_id(conn, inventory_id))?
            .ok_or_else(inventory_not_found)?;
        let user_id = user_id.to_owned();
        if inventory.owner_id.to_string() != user_id && inventory.holder_id.to_string() != user_id {
            return Err(Error::Forbidden(
                "Not allowed to see this inventory".to_owned(),
            ));
        }
        self.list_movements(
            Filter::eq("t.inventory_id", inventory_id.to_owned()),
            &format!("/inventories/{}/transactions", inventory_id),
            page,
        )
    }

    /// Movements of every inventory of the caller in a role.
    pub fn role_movements(
        &self,
        user_id: &str,
        role: StockRole,
        page: &PageQuery,
    ) -> Result<Paginated<InventoryTransactionView>, Error> {
        self.list_movements(
            Filter::eq(role.column(), user_id.to_owned()),
            &format!("/inventories/transactions/{}", role.path()),
            page,
        )
    }

    /// Soft delete an inventory without reservations.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - "Inventory not found"
    /// * `Error::Forbidden` - caller is not the owner
    /// * `Error::Conflict` - "Can't delete inventory with reserved units!"
    /// * `Error::BadRequest` - already deleted
    ///
    pub fn delete_inventory(&self, user_id: &str, inventory_id: &str) -> Result<(), Error> {
        self.db.transaction(|conn| {
            let inventory = inventory_by_id(conn, inventory_id)?.ok_or_else(inventory_not_found)?;
            if inventory.owner_id.to_string() != user_id {
                return Err(Error::Forbidden(
                    "Only the owner can delete an inventory".to_owned(),
                ));
            }
            if inventory.reserved_qty > 0 {
                return Err(Error::Conflict(
                    "Can't delete inventory with reserved units!".to_owned(),
                ));
            }
            if inventory.status == InventoryStatus::SoftDeleted {
                return Err(Error::BadRequest("Inventory already deleted".to_owned()));
            }
            conn.execute(
                "UPDATE inventories SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![inventory_id, InventoryStatus::SoftDeleted, now()],
            )?;
            InventoryMovement {
                inventory_id,
                product_id: &inventory.product_id.to_string(),
                created_by: user_id,
                transaction_type: InventoryTransactionType::Debit,
                quantity: inventory.available_qty,
                source: InventoryTransactionSource::Deletion,
                source_ref_id: None,
                note: "delete inventory",
            }
            .insert(conn)?;
            Ok(())
        })?;
        log::info!("Inventory {} deleted by user {}", inventory_id, user_id);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::super::testing::*;
    use super::testing::stock;
    use super::*;

    #[test]
    fn test_add_merges_stock() {
        let t = test_api();
        let owner = create_user(&t.api, "owner@example.com", false, 0).id.to_string();
        let holder = create_user(&t.api, "holder@example.com", false, 0).id.to_string();
        let view = stock(&t.api, &owner, &holder, "036000291452", 5);
        assert_eq!(view.available_qty, 5);
        assert_eq!(view.holder.email, "holder@example.com");

        let mut request = AddInventoryRequest {
            product_id: view.product.id,
            available_qty: 3,
            holder_id: Uuid::parse_str(&holder).unwrap(),
            owner_id: Uuid::parse_str(&owner).unwrap(),
            location: "94105-1234".to_owned(),
        };
        let merged = t.api.add_inventory(&holder, &request).unwrap();
        assert_eq!(merged.id, view.id);
        assert_eq!(merged.available_qty, 8);

        request.location = "941".to_owned();
        assert_eq!(
            t.api.add_inventory(&holder, &request).unwrap_err(),
            Error::BadRequest("invalid zip code.".to_owned())
        );
        request.location = "94105".to_owned();
        let stranger = create_user(&t.api, "x@example.com", false, 0).id.to_string();
        assert_eq!(
            t.api.add_inventory(&stranger, &request).unwrap_err(),
            Error::BadRequest("user has to be either holder or owner.".to_owned())
        );
        request.available_qty = i64::MAX;
        assert_eq!(
            t.api.add_inventory(&owner, &request).unwrap_err(),
            Error::BadRequest("invalid available_qty".to_owned())
        );
        request.available_qty = 0;
        assert_eq!(
            t.api.add_inventory(&owner, &request).unwrap_err(),
            Error::BadRequest("invalid available_qty".to_owned())
        );

        let movements = t
            .api
            .inventory_movements(&owner, &view.id.to_string(), &PageQuery::default())
            .unwrap();
        assert_eq!(movements.data.len(), 2);
        assert!(matches!(
            t.api
                .inventory_movements(&stranger, &view.id.to_string(), &PageQuery::default()),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_role_listings() {
        let t = test_api();
        let owner = create_user(&t.api, "owner@example.com", false, 0).id.to_string();
        let holder = create_user(&t.api, "holder@example.com", false, 0).id.to_string();
        stock(&t.api, &owner, &holder, "036000291452", 5);
        stock(&t.api, &owner, &owner, "012345678905", 1);

        let search = InventorySearch::default();
        let owned = t
            .api
            .list_inventories(&owner, StockRole::Owner, &search, &PageQuery::default())
            .unwrap();
        assert_eq!(owned.data.len(), 2);
        let held = t
            .api
            .list_inventories(&holder, StockRole::Holder, &search, &PageQuery::default())
            .unwrap();
        assert_eq!(held.data.len(), 1);
        let named = InventorySearch {
            q: Some("012345".to_owned()),
        };
        assert_eq!(
            t.api
                .list_inventories(&owner, StockRole::Owner, &named, &PageQuery::default())
                .unwrap()
                .data
                .len(),
            1
        );
        assert_eq!(
            t.api
                .role_movements(&holder, StockRole::Holder, &PageQuery::default())
                .unwrap()
                .data
                .len(),
            1
        );
    }

    #[test]
    fn test_delete_inventory() {
        let t = test_api();
        let owner = create_user(&t.api, "owner@example.com", false, 0).id.to_string();
        let holder = create_user(&t.api, "holder@example.com", false, 0).id.to_string();
        let view = stock(&t.api, &owner, &holder, "036000291452", 5);
        let id = view.id.to_string();

        assert!(matches!(
            t.api.delete_inventory(&holder, &id),
            Err(Error::Forbidden(_))
        ));
        t.api
            .db
            .call(|conn| {
                Ok(conn.execute(
                    "UPDATE inventories SET reserved_qty = 1 WHERE id = ?1",
                    params![id],
                )?)
            })
            .unwrap();
        assert_eq!(
            t.api.delete_inventory(&owner, &id).unwrap_err(),
            Error::Conflict("Can't delete inventory with reserved units!".to_owned())
        );
        t.api
            .db
            .call(|conn| {
                Ok(conn.execute(
                    "UPDATE inventories SET reserved_qty = 0 WHERE id = ?1",
                    params![id],
                )?)
            })
            .unwrap();
        t.api.delete_inventory(&owner, &id).unwrap();
        assert!(matches!(
            t.api.delete_inventory(&owner, &id),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            t.api.delete_inventory(&owner, "missing"),
            Err(Error::NotFound(_))
        ));
        assert!(t
            .api
            .list_inventories(
                &owner,
                StockRole::Owner,
                &InventorySearch::default(),
                &PageQuery::default()
            )
            .unwrap()
            .data
            .is_empty());
    }
}
