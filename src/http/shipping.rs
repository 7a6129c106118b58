// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shipping: `/labels` and `/orders`.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Multipart,
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::api::{CargoveraApi, MAX_UPLOAD_FILES, MAX_UPLOAD_MB};
use crate::carriers::parse_carrier;
use crate::error::Error;
use crate::model::label::{
    BuyLabelRequest, CancelLabelRequest, Label, LabelFilters, LabelUploadResponse, LabelUrl,
    RatesRequest, UploadedFile, ValidationResult,
};
use crate::model::order::{Order, OrderFilters, OrderInput};
use crate::model::pagination::{PageQuery, Paginated};

use super::{CurrentUser, Json, Path, Query};

/// Room for a full batch of uploads plus the multipart framing.
const UPLOAD_BODY_LIMIT: usize = (MAX_UPLOAD_FILES * MAX_UPLOAD_MB + 1) * 1024 * 1024;

async fn rates(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(carrier): Path<String>,
    Json(body): Json<RatesRequest>,
) -> Result<Json<Value>, Error> {
    log::debug!("Rates requested through {}", carrier);
    let rates = api.rates(&user.id.to_string(), &body).await?;
    Ok(Json(json!({ "data": rates })))
}

async fn buy_label(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(carrier): Path<String>,
    Json(body): Json<BuyLabelRequest>,
) -> Result<Json<Value>, Error> {
    let carrier = parse_carrier(&carrier)?;
    let labels = api.buy_label(&user.id.to_string(), carrier, body).await?;
    Ok(Json(json!({ "data": labels })))
}

async fn validate(
    State(api): State<CargoveraApi>,
    CurrentUser(_): CurrentUser,
    Path(carrier): Path<String>,
    Json(body): Json<BuyLabelRequest>,
) -> Result<Json<ValidationResult>, Error> {
    let carrier = parse_carrier(&carrier)?;
    Ok(Json(api.validate_shipment(carrier, &body).await?))
}

async fn cancel_label(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(carrier): Path<String>,
    Json(body): Json<CancelLabelRequest>,
) -> Result<StatusCode, Error> {
    let carrier = parse_carrier(&carrier)?;
    api.cancel_label(&user.id.to_string(), carrier, &body.tracking_number)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_labels(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<LabelFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Label>>, Error> {
    Ok(Json(api.list_labels(&user.id.to_string(), &filters, &page)?))
}

async fn labels_of_order(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(order_number): Path<String>,
) -> Result<Json<Vec<LabelUrl>>, Error> {
    Ok(Json(api.labels_of_order(&user.id.to_string(), &order_number)?))
}

async fn label_url(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<LabelUrl>, Error> {
    Ok(Json(api.label_url(&user.id.to_string(), &id)?))
}

fn bad_multipart(error: MultipartError) -> Error {
    Error::BadRequest(format!("Invalid upload: {}", error.body_text()))
}

async fn upload_labels(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<LabelUploadResponse>, Error> {
    let mut multipart = multipart?;
    let mut files = vec![];
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_owned();
        let content_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await.map_err(bad_multipart)?.to_vec();
        files.push(UploadedFile {
            filename,
            content_type,
            data,
        });
    }
    let label_ids = api.upload_labels(&user.id.to_string(), files).await?;
    Ok(Json(LabelUploadResponse { label_ids }))
}

async fn label_file(
    State(api): State<CargoveraApi>,
    Path(token): Path<String>,
) -> Result<Response, Error> {
    let (bytes, content_type) = api.label_file(&token).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub fn label_routes() -> Router<CargoveraApi> {
    // The router wants one parameter name per position: `:key` is a carrier
    // or a label id depending on the route.
    Router::new()
        .route("/", get(list_labels))
        .route("/:key/rates", post(rates))
        .route("/:key/buy-label", post(buy_label))
        .route("/:key/validate", post(validate))
        .route("/:key/cancel-label", post(cancel_label))
        .route("/order/:order_number", get(labels_of_order))
        .route("/:key/url", get(label_url))
        .route(
            "/upload",
            post(upload_labels).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/files/:token", get(label_file))
}

async fn list_orders(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(filters): Query<OrderFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Order>>, Error> {
    Ok(Json(api.list_orders(&user.id.to_string(), &filters, &page)?))
}

async fn skip_order(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, Error> {
    let skipped = api.skip_order(&user.id.to_string(), &id)?;
    Ok(Json(json!({ "data": skipped })))
}

async fn bulk_insert(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(orders): Json<Vec<OrderInput>>,
) -> Result<(StatusCode, Json<Value>), Error> {
    let inserted = api.bulk_insert_orders(&user.id.to_string(), orders)?;
    Ok((StatusCode::CREATED, Json(json!({ "inserted": inserted }))))
}

pub fn order_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id/skip", post(skip_order))
        .route("/bulk", post(bulk_insert))
}
