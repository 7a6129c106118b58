// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Money: `/transactions`, `/payments` and `/admin`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::api::CargoveraApi;
use crate::error::Error;
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::payment::{PaymentIntentRequest, PaymentIntentResponse};
use crate::model::transaction::{Transaction, TransactionFilters};
use crate::model::user::{AdminUserFilters, MultiplierRequest, TopupRequest, UserMe};

use super::{AdminUser, CurrentUser, Json, Path, Query};

const STRIPE_SIGNATURE: &str = "Stripe-Signature";

async fn list_transactions(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<TransactionFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Transaction>>, Error> {
    Ok(Json(api.list_transactions(&user.id.to_string(), &filters, &page)?))
}

pub fn transaction_routes() -> Router<CargoveraApi> {
    Router::new().route("/", get(list_transactions))
}

async fn create_payment_intent(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, Error> {
    Ok(Json(
        api.create_payment_intent(&user.id.to_string(), &body).await?,
    ))
}

/// Stripe events. The signature covers the raw body, so it is read as bytes.
async fn stripe_webhook(
    State(api): State<CargoveraApi>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, Error> {
    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|value| value.to_str().ok());
    api.stripe_webhook(&body, signature)?;
    Ok(Json(json!({ "status": "success" })))
}

pub fn payment_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/stripe/webhook", post(stripe_webhook))
}

async fn list_users(
    State(api): State<CargoveraApi>,
    AdminUser(_): AdminUser,
    Query(filters): Query<AdminUserFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<UserMe>>, Error> {
    Ok(Json(api.admin_list_users(&filters, &page)?))
}

async fn activate(
    State(api): State<CargoveraApi>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserMe>, Error> {
    log::info!("Admin {} activates user {}", admin.id, user_id);
    Ok(Json(api.activate_user(&user_id)?))
}

async fn set_multiplier(
    State(api): State<CargoveraApi>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
    Json(body): Json<MultiplierRequest>,
) -> Result<Json<UserMe>, Error> {
    log::info!("Admin {} sets the multiplier of user {}", admin.id, user_id);
    Ok(Json(api.set_multiplier(&user_id, &body)?))
}

async fn topup(
    State(api): State<CargoveraApi>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
    Json(body): Json<TopupRequest>,
) -> Result<Json<UserMe>, Error> {
    log::info!("Admin {} adjusts the balance of user {}", admin.id, user_id);
    Ok(Json(api.topup(&user_id, &body)?))
}

pub fn admin_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/users", get(list_users))
        .route("/:user_id/activate", post(activate))
        .route("/:user_id/multiplier", post(set_multiplier))
        .route("/:user_id/topup", post(topup))
}
