// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::{
    extract::{MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::error::Error;

use super::Metrics;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub async fn handler_metrics(State(metrics): State<Metrics>) -> Result<Response, Error> {
    let body = metrics.encode()?;
    Ok(([(header::CONTENT_TYPE, OPENMETRICS)], body).into_response())
}

/// Routes serving the registry.
pub fn build_routes(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(handler_metrics))
        .with_state(metrics)
}

/// Count every request by method, matched route and status.
pub async fn track_requests(State(metrics): State<Metrics>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let response = next.run(request).await;
    log::debug!("{} {} -> {}", method, path, response.status());
    metrics.http_request(&method, &path, response.status().as_u16());
    response
}
