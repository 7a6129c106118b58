// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use rusqlite::{params, OptionalExtension};

use crate::database::{day_range, new_id, now, Filter, Listing};
use crate::error::Error;
use crate::model::order::{Order, OrderFilters, OrderInput, OrderStatus, SkipOrderResponse};
use crate::model::pagination::{PageQuery, Paginated};

use super::CargoveraApi;

impl CargoveraApi {
    pub fn list_orders(
        &self,
        user_id: &str,
        filters: &OrderFilters,
        page: &PageQuery,
    ) -> Result<Paginated<Order>, Error> {
        let mut conditions = vec![Filter::eq("user_id", user_id.to_owned())];
        if let Some(status) = filters.status {
            conditions.push(Filter::eq("status", status));
        }
        if let Some(order_number) = filters.order_number.clone().filter(|o| !o.is_empty()) {
            conditions.push(Filter::eq("order_number", order_number));
        }
        if let Some(store_name) = filters.store_name.clone().filter(|s| !s.is_empty()) {
            conditions.push(Filter::eq("store_name", store_name));
        }
        conditions.extend(day_range(
            "order_date",
            filters.date_from.as_deref(),
            filters.date_to.as_deref(),
        )?);
        let listing = Listing {
            columns: Order::COLUMNS,
            from: "orders",
            id_column: "id",
            created_column: "created_at",
            filters: conditions,
            base_path: "/orders",
        };
        self.db
            .call(|conn| listing.paginate(conn, page, Order::from_row))
    }

    /// Set aside a new order that will not get a label.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - "order_id {id} not found"
    /// * `Error::BadRequest` - the order is not new
    ///
    pub fn skip_order(&self, user_id: &str, order_id: &str) -> Result<SkipOrderResponse, Error> {
        let order = self.db.transaction(|conn| {
            let order = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM orders WHERE id = ?1 AND user_id = ?2",
                        Order::COLUMNS
                    ),
                    params![order_id, user_id],
                    Order::from_row,
                )
                .optional()?
                .ok_or_else(|| Error::NotFound(format!("order_id {} not found", order_id)))?;
            if order.status != OrderStatus::New {
                return Err(Error::BadRequest(format!(
                    "order id {} should be in new status",
                    order_id
                )));
            }
            conn.execute(
                "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![order_id, OrderStatus::Others, now()],
            )?;
            Ok(order)
        })?;
        log::info!("Order {} skipped by user {}", order.order_number, user_id);
        Ok(SkipOrderResponse {
            order_id: order.id,
            status: OrderStatus::Others,
        })
    }

    /// Import orders. Either every order is stored or none is.
    ///
    /// # Errors
    ///
    /// * `Error::Conflict` - "Order number already exists!"
    ///
    pub fn bulk_insert_orders(&self, user_id: &str, orders: Vec<OrderInput>) -> Result<usize, Error> {
        let today = chrono::Utc::now().date_naive();
        let count = orders.len();
        self.db
            .transaction(|conn| {
                let now = now();
                for order in &orders {
                    conn.execute(
                        "INSERT INTO orders (id, user_id, store_name, order_number, item_name, \
                         item_sku, item_qty, order_date, ship_by, deliver_by, status, \
                         total_amount_cents, delivery_notes, buyer_address, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                        params![
                            new_id(),
                            user_id,
                            order.store_name,
                            order.order_number,
                            order.item_name,
                            order.item_sku,
                            order.item_qty,
                            order.order_date.unwrap_or(today).to_string(),
                            order.ship_by.map(|d| d.to_string()),
                            order.deliver_by.map(|d| d.to_string()),
                            order.status.unwrap_or(OrderStatus::New),
                            order.total_amount.cents(),
                            order.delivery_notes,
                            serde_json::to_string(&order.buyer_address)?,
                            now
                        ],
                    )?;
                }
                Ok(())
            })
            .map_err(|e| match e {
                Error::Constraint(_) => Error::Conflict("Order number already exists!".to_owned()),
                e => e,
            })?;
        log::info!("User {} imported {} order(s)", user_id, count);
        Ok(count)
    }
}
