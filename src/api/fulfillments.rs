// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fulfillment requests.
//!
//! An owner asks the holder of some inventories to ship units. Creating a
//! request reserves the units, fulfilling it takes them out of stock and marks
//! the attached labels shipped.

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::database::{date_range, new_id, now, Filter, Listing};
use crate::error::Error;
use crate::mail::{send_in_background, shipment_email, ShipmentLine};
use crate::model::fulfillment::{
    FulfillmentCreated, FulfillmentFilters, FulfillmentItem, FulfillmentItemView,
    FulfillmentOutcome, FulfillmentRequest, FulfillmentRequestCreate, FulfillmentRequestView,
    FulfillmentStatus,
};
use crate::model::inventory::{
    InventoryMovement, InventoryStatus, InventoryTransactionSource, InventoryTransactionType,
    InventoryView,
};
use crate::model::label::LabelStatus;
use crate::model::pagination::{PageQuery, Paginated};

use super::inventories::inventory_by_id;
use super::{user_by_id, CargoveraApi, StockRole};

fn request_not_found() -> Error {
    Error::NotFound("Fulfillment request not found".to_owned())
}

fn request_by_id(conn: &Connection, id: &str) -> Result<FulfillmentRequest, Error> {
    conn.query_row(
        &format!(
            "SELECT {} FROM fulfillment_requests WHERE id = ?1",
            FulfillmentRequest::COLUMNS
        ),
        params![id],
        FulfillmentRequest::from_row,
    )
    .optional()?
    .ok_or_else(request_not_found)
}

fn items_of(conn: &Connection, request_id: &str) -> Result<Vec<FulfillmentItem>, Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM fulfillment_items WHERE request_id = ?1",
        FulfillmentItem::COLUMNS
    ))?;
    let items = stmt
        .query_map(params![request_id], FulfillmentItem::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

/// Items of the given requests, grouped by request id.
fn item_views(
    conn: &Connection,
    request_ids: &[String],
) -> Result<HashMap<String, Vec<FulfillmentItemView>>, Error> {
    let mut grouped: HashMap<String, Vec<FulfillmentItemView>> = HashMap::new();
    if request_ids.is_empty() {
        return Ok(grouped);
    }
    let placeholders = vec!["?"; request_ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE f.request_id IN ({})",
        FulfillmentItemView::columns(),
        FulfillmentItemView::FROM,
        placeholders
    ))?;
    let rows = stmt.query_map(params_from_iter(request_ids.iter()), FulfillmentItemView::from_row)?;
    for row in rows {
        let (request_id, item) = row?;
        grouped.entry(request_id).or_default().push(item);
    }
    Ok(grouped)
}

impl CargoveraApi {
    /// Reserve units of the caller's inventories and ask their holder to ship
    /// them. The holder is notified by mail, with the owner in copy.
    ///
    /// # Errors
    ///
    /// * `Error::BadRequest` - no items, mixed holders or owners, caller not the
    ///   owner, inactive inventory or not enough free units
    /// * `Error::NotFound` - "Some inventories not found."
    ///
    pub fn create_fulfillment(
        &self,
        user_id: &str,
        request: &FulfillmentRequestCreate,
    ) -> Result<FulfillmentCreated, Error> {
        if request.items.is_empty() {
            return Err(Error::BadRequest("At least one item is required.".to_owned()));
        }
        if let Some(item) = request.items.iter().find(|item| item.quantity <= 0) {
            return Err(Error::BadRequest(format!(
                "Invalid quantity for inventory {}",
                item.inventory_id
            )));
        }
        let request_id = new_id();
        let (email, item_count) = self.db.transaction(|conn| {
            let mut views = vec![];
            for item in &request.items {
                let view = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM {} WHERE i.id = ?1",
                            InventoryView::COLUMNS,
                            InventoryView::FROM
                        ),
                        params![item.inventory_id.to_string()],
                        InventoryView::from_row,
                    )
                    .optional()?
                    .ok_or_else(|| Error::NotFound("Some inventories not found.".to_owned()))?;
                let inventory = inventory_by_id(conn, &item.inventory_id.to_string())?
                    .ok_or_else(|| Error::NotFound("Some inventories not found.".to_owned()))?;
                views.push((view, inventory));
            }

            let (first, _) = &views[0];
            let (holder, owner) = (first.holder.clone(), first.owner.clone());
            if views.iter().any(|(v, _)| v.holder.id != holder.id) {
                return Err(Error::BadRequest(
                    "All inventories must have the same holder.".to_owned(),
                ));
            }
            if views.iter().any(|(v, _)| v.owner.id != owner.id) {
                return Err(Error::BadRequest(
                    "All inventories must have the same owner.".to_owned(),
                ));
            }
            if owner.id.to_string() != user_id {
                return Err(Error::BadRequest(
                    "Only the owner of the inventories can request a shipment.".to_owned(),
                ));
            }
            if let Some((_, inventory)) = views
                .iter()
                .find(|(_, inventory)| inventory.status != InventoryStatus::Active)
            {
                return Err(Error::BadRequest(format!(
                    "Inventory {} is not active.",
                    inventory.id
                )));
            }

            let mut needed: HashMap<String, i64> = HashMap::new();
            for item in &request.items {
                let total = needed.entry(item.inventory_id.to_string()).or_default();
                *total = total.checked_add(item.quantity).ok_or_else(|| {
                    Error::BadRequest(format!(
                        "Not enough quantity for inventory {}",
                        item.inventory_id
                    ))
                })?;
            }
            for (_, inventory) in &views {
                let id = inventory.id.to_string();
                let free = inventory.available_qty - inventory.reserved_qty;
                if needed.get(&id).copied().unwrap_or_default() > free {
                    return Err(Error::BadRequest(format!(
                        "Not enough quantity for inventory {}",
                        id
                    )));
                }
            }

            let now = now();
            conn.execute(
                "INSERT INTO fulfillment_requests (id, owner_id, holder_id, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    request_id,
                    owner.id.to_string(),
                    holder.id.to_string(),
                    FulfillmentStatus::Pending,
                    now
                ],
            )?;
            let mut lines = vec![];
            for (item, (view, _)) in request.items.iter().zip(&views) {
                conn.execute(
                    "UPDATE inventories SET reserved_qty = reserved_qty + ?2, updated_at = ?3 \
                     WHERE id = ?1",
                    params![item.inventory_id.to_string(), item.quantity, now],
                )?;
                conn.execute(
                    "INSERT INTO fulfillment_items (id, request_id, inventory_id, quantity, label_urls) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        new_id(),
                        request_id,
                        item.inventory_id.to_string(),
                        item.quantity,
                        serde_json::to_string(&item.label_urls)?
                    ],
                )?;
                lines.push(ShipmentLine {
                    name: view.product.name.clone(),
                    upc: view.product.upc.clone(),
                    quantity: item.quantity,
                });
            }
            let email = shipment_email(
                &holder.email,
                &owner.email,
                &owner.name,
                &request_id,
                &lines,
                "",
            );
            Ok((email, lines.len()))
        })?;
        send_in_background(self.mailer.clone(), email);
        log::info!(
            "Fulfillment request {} with {} item(s) created by user {}",
            request_id,
            item_count,
            user_id
        );
        Ok(FulfillmentCreated {
            request_id: Uuid::parse_str(&request_id).map_err(|e| Error::Internal(e.to_string()))?,
        })
    }

    /// Withdraw a pending request, releasing its reservations.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - "Fulfillment request not found"
    /// * `Error::Forbidden` - caller is not the owner
    /// * `Error::BadRequest` - the request is not pending
    ///
    pub fn cancel_fulfillment(&self, user_id: &str, request_id: &str) -> Result<(), Error> {
        self.db.transaction(|conn| {
            let request = request_by_id(conn, request_id)?;
            if request.owner_id.to_string() != user_id {
                return Err(Error::Forbidden(
                    "Only the owner can cancel a fulfillment request".to_owned(),
                ));
            }
            if request.status != FulfillmentStatus::Pending {
                return Err(Error::BadRequest(
                    "Only pending requests can be cancelled".to_owned(),
                ));
            }
            let now = now();
            for item in items_of(conn, request_id)? {
                conn.execute(
                    "UPDATE inventories SET reserved_qty = MAX(reserved_qty - ?2, 0), updated_at = ?3 \
                     WHERE id = ?1",
                    params![item.inventory_id.to_string(), item.quantity, now],
                )?;
            }
            conn.execute(
                "DELETE FROM fulfillment_items WHERE request_id = ?1",
                params![request_id],
            )?;
            conn.execute(
                "DELETE FROM fulfillment_requests WHERE id = ?1",
                params![request_id],
            )?;
            Ok(())
        })?;
        log::info!("Fulfillment request {} cancelled by user {}", request_id, user_id);
        Ok(())
    }

    /// Requests of the caller as owner or holder, with their items.
    pub fn list_fulfillments(
        &self,
        user_id: &str,
        role: StockRole,
        filters: &FulfillmentFilters,
        page: &PageQuery,
    ) -> Result<Paginated<FulfillmentRequestView>, Error> {
        let (column, base_path) = match role {
            StockRole::Owner => ("owner_id", "/fulfillments/requests/owner"),
            StockRole::Holder => ("holder_id", "/fulfillments/requests/holder"),
        };
        let mut conditions = vec![
            Filter::eq(column, user_id.to_owned()),
            Filter::eq(
                "status",
                filters.status.unwrap_or(FulfillmentStatus::Pending),
            ),
        ];
        conditions.extend(date_range(
            "created_at",
            filters.date_from.as_deref(),
            filters.date_to.as_deref(),
        )?);
        let listing = Listing {
            columns: FulfillmentRequest::COLUMNS,
            from: "fulfillment_requests",
            id_column: "id",
            created_column: "created_at",
            filters: conditions,
            base_path,
        };
        self.db.call(|conn| {
            let page = listing.paginate(conn, page, FulfillmentRequest::from_row)?;
            let ids: Vec<String> = page.data.iter().map(|r| r.id.to_string()).collect();
            let mut items = item_views(conn, &ids)?;
            page.try_map(|request| {
                Ok(FulfillmentRequestView {
                    items: items.remove(&request.id.to_string()).unwrap_or_default(),
                    id: request.id,
                    status: request.status,
                    created_at: request.created_at,
                })
            })
        })
    }

    /// Confirm the shipment of a pending request by its holder.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - unknown request or label
    /// * `Error::BadRequest` - "Request already fulfilled", or quantities out of sync
    /// * `Error::Forbidden` - caller is not the holder
    ///
    pub fn fulfill_request(
        &self,
        user_id: &str,
        request_id: &str,
        note: Option<&str>,
    ) -> Result<FulfillmentOutcome, Error> {
        let outcome = self.db.transaction(|conn| {
            let request = request_by_id(conn, request_id)?;
            if request.status != FulfillmentStatus::Pending {
                return Err(Error::BadRequest("Request already fulfilled".to_owned()));
            }
            if request.holder_id.to_string() != user_id {
                return Err(Error::Forbidden(
                    "Only the holder can fulfill this request".to_owned(),
                ));
            }
            user_by_id(conn, user_id)?;
            let now = now();
            for item in items_of(conn, request_id)? {
                let inventory_id = item.inventory_id.to_string();
                let inventory = inventory_by_id(conn, &inventory_id)?.ok_or_else(|| {
                    Error::NotFound(format!("Inventory {} not found", inventory_id))
                })?;
                if inventory.available_qty < item.quantity || inventory.reserved_qty < item.quantity
                {
                    return Err(Error::BadRequest(format!(
                        "Quantities of inventory {} do not match the request",
                        inventory_id
                    )));
                }
                let available = inventory.available_qty - item.quantity;
                let status = if available == 0 {
                    InventoryStatus::Inactive
                } else {
                    inventory.status
                };
                conn.execute(
                    "UPDATE inventories SET available_qty = ?2, reserved_qty = reserved_qty - ?3, \
                     status = ?4, updated_at = ?5 WHERE id = ?1",
                    params![inventory_id, available, item.quantity, status, now],
                )?;
                InventoryMovement {
                    inventory_id: &inventory_id,
                    product_id: &inventory.product_id.to_string(),
                    created_by: user_id,
                    transaction_type: InventoryTransactionType::Debit,
                    quantity: item.quantity,
                    source: InventoryTransactionSource::Outbound,
                    source_ref_id: Some(request_id),
                    note: note.unwrap_or("fulfillment request"),
                }
                .insert(conn)?;
                conn.execute(
                    "UPDATE fulfillment_items SET fulfilled_at = ?2, note = ?3 WHERE id = ?1",
                    params![item.id.to_string(), now, note],
                )?;
                for label_id in &item.label_urls {
                    let updated = conn.execute(
                        "UPDATE labels SET status = ?2, updated_at = ?3 WHERE id = ?1",
                        params![label_id, LabelStatus::Shipped, now],
                    )?;
                    if updated == 0 {
                        return Err(Error::NotFound(format!("Label {} not found", label_id)));
                    }
                }
            }
            conn.execute(
                "UPDATE fulfillment_requests SET status = ?2 WHERE id = ?1",
                params![request_id, FulfillmentStatus::Fulfilled],
            )?;
            Ok(FulfillmentOutcome {
                request_id: request.id,
                status: FulfillmentStatus::Fulfilled,
            })
        })?;
        log::info!("Fulfillment request {} fulfilled by user {}", request_id, user_id);
        Ok(outcome)
    }
}
