// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # HTTP API.
//!
//! Routers over [`CargoveraApi`]. Handlers extract the caller with
//! [`CurrentUser`] or [`AdminUser`] and return `Result<_, Error>`, errors are
//! rendered as `{"detail": ...}`.
//!

mod accounts;
mod extract;
mod ledger;
mod shipping;
mod stock;

use axum::{http::HeaderValue, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::api::CargoveraApi;
use crate::error::Error;

pub use extract::{AdminUser, CurrentUser, Json, Path, Query, ACCESS_COOKIE};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> Error {
    Error::NotFound("Not Found".to_owned())
}

/// Credentialed CORS for the configured origins, `*` mirrors any origin.
fn cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// The HTTP application.
pub fn app(api: CargoveraApi) -> Router {
    let settings = api.settings().clone();
    let router = Router::new()
        .route("/health", get(health))
        .nest("/auth", accounts::auth_routes())
        .nest("/users", accounts::user_routes())
        .nest("/addresses", accounts::address_routes())
        .nest("/webstores", accounts::webstore_routes())
        .nest("/labels", shipping::label_routes())
        .nest("/orders", shipping::order_routes())
        .nest("/transactions", ledger::transaction_routes())
        .nest("/payments", ledger::payment_routes())
        .nest("/admin", ledger::admin_routes())
        .nest("/products", stock::product_routes())
        .nest("/inventories", stock::inventory_routes())
        .nest("/fulfillments", stock::fulfillment_routes())
        .fallback(not_found)
        .with_state(api.clone());

    #[cfg(feature = "prometheus")]
    let router = {
        let metrics = api.metrics().clone();
        let router = if settings.server.metrics {
            router.merge(crate::prometheus::server::build_routes(metrics.clone()))
        } else {
            router
        };
        router.layer(axum::middleware::from_fn_with_state(
            metrics,
            crate::prometheus::server::track_requests,
        ))
    };

    router.layer(cors(&settings.server.cors_origins))
}


#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::testing::*;
    use crate::api::testing::*;

    #[tokio::test]
    async fn test_health() {
        let t = test_api();
        let (status, body) = send(&router(&t), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_errors_are_json_detail() {
        let t = test_api();
        let app = router(&t);
        let (status, body) = send(&app, "GET", "/addresses", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Not authenticated"}));

        let (status, body) = send(&app, "GET", "/addresses", Some("Bearer nope"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"detail": "Invalid token"}));
    }

    #[tokio::test]
    async fn test_rejected_input_is_json_detail() {
        let t = test_api();
        let user = create_user(&t.api, "user@example.com", false, 0);
        let auth = bearer(&t, &user);
        let app = router(&t);

        let response = app
            .clone()
            .oneshot(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["detail"].is_string());

        for uri in ["/labels?limit=abc", "/orders?page=-1"] {
            let (status, body) = send(&app, "GET", uri, Some(&auth), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(body["detail"].is_string(), "{}", uri);
        }

        let (status, body) = send(&app, "GET", "/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Not Found"}));
    }

    #[cfg(feature = "prometheus")]
    #[tokio::test]
    async fn test_metrics_served() {
        let t = test_api();
        let app = router(&t);
        send(&app, "GET", "/health", None, None).await;
        let response = tower::ServiceExt::oneshot(
            app,
            axum::http::Request::get("/metrics")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"http_requests_total{method="GET",path="/health",status="200"} 1"#));
    }
}
