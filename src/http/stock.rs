// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stock: `/products`, `/inventories` and `/fulfillments`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};

use crate::api::{CargoveraApi, StockRole};
use crate::error::Error;
use crate::model::fulfillment::{
    ConfirmFulfillRequest, FulfillmentFilters, FulfillmentRequestCreate, FulfillmentRequestView,
};
use crate::model::inventory::{
    AddInventoryRequest, InventorySearch, InventoryTransactionView, InventoryView,
};
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::product::{AddProductRequest, Product, ProductFilters};

use super::{CurrentUser, Json, Path, Query};

async fn list_products(
    State(api): State<CargoveraApi>,
    CurrentUser(_): CurrentUser,
    Query(filters): Query<ProductFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Product>>, Error> {
    Ok(Json(api.list_products(&filters, &page)?))
}

async fn add_product(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AddProductRequest>,
) -> Result<Json<Product>, Error> {
    Ok(Json(api.add_product(&user.id.to_string(), body)?))
}

pub fn product_routes() -> Router<CargoveraApi> {
    Router::new().route("/", get(list_products).post(add_product))
}

async fn add_inventory(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AddInventoryRequest>,
) -> Result<Json<InventoryView>, Error> {
    Ok(Json(api.add_inventory(&user.id.to_string(), &body)?))
}

async fn owned_inventories(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(search): Query<InventorySearch>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<InventoryView>>, Error> {
    let listed = api.list_inventories(&user.id.to_string(), StockRole::Owner, &search, &page)?;
    Ok(Json(listed))
}

async fn held_inventories(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(search): Query<InventorySearch>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<InventoryView>>, Error> {
    let listed = api.list_inventories(&user.id.to_string(), StockRole::Holder, &search, &page)?;
    Ok(Json(listed))
}

async fn inventory_movements(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<InventoryTransactionView>>, Error> {
    Ok(Json(api.inventory_movements(&user.id.to_string(), &id, &page)?))
}

async fn owner_movements(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<InventoryTransactionView>>, Error> {
    Ok(Json(api.role_movements(
        &user.id.to_string(),
        StockRole::Owner,
        &page,
    )?))
}

async fn holder_movements(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<InventoryTransactionView>>, Error> {
    Ok(Json(api.role_movements(
        &user.id.to_string(),
        StockRole::Holder,
        &page,
    )?))
}

async fn delete_inventory(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    api.delete_inventory(&user.id.to_string(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn inventory_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/", post(add_inventory))
        .route("/owner", get(owned_inventories))
        .route("/holder", get(held_inventories))
        .route("/transactions/owner", get(owner_movements))
        .route("/transactions/holder", get(holder_movements))
        .route("/:id/transactions", get(inventory_movements))
        .route("/:id", delete(delete_inventory))
}

async fn create_request(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<FulfillmentRequestCreate>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let created = api.create_fulfillment(&user.id.to_string(), &body)?;
    Ok((StatusCode::CREATED, Json(json!({ "data": created }))))
}

async fn cancel_request(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    api.cancel_fulfillment(&user.id.to_string(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn owner_requests(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<FulfillmentFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<FulfillmentRequestView>>, Error> {
    Ok(Json(api.list_fulfillments(
        &user.id.to_string(),
        StockRole::Owner,
        &filters,
        &page,
    )?))
}

async fn holder_requests(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<FulfillmentFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<FulfillmentRequestView>>, Error> {
    Ok(Json(api.list_fulfillments(
        &user.id.to_string(),
        StockRole::Holder,
        &filters,
        &page,
    )?))
}

/// The holder confirms the shipment. The body is optional.
async fn fulfill(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<ConfirmFulfillRequest>>,
) -> Result<Json<Value>, Error> {
    let note = body.and_then(|Json(body)| body.note);
    let outcome = api.fulfill_request(&user.id.to_string(), &id, note.as_deref())?;
    Ok(Json(json!({ "data": outcome })))
}

pub fn fulfillment_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/owner", get(owner_requests))
        .route("/requests/holder", get(holder_requests))
        .route("/requests/:id", post(fulfill).delete(cancel_request))
}
