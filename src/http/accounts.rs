// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Accounts: `/auth`, `/users`, `/addresses` and `/webstores`.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::CargoveraApi;
use crate::error::Error;
use crate::model::address::{Address, AddressInput};
use crate::model::pagination::{PageQuery, Paginated};
use crate::model::user::{
    ForgotPasswordRequest, ResetPasswordRequest, TokenResponse, UserLogin, UserMe, UserRegister,
    UserSummary, UserUpdate,
};
use crate::model::webstore::{Webstore, WebstoreCreate, WebstoreUpdate};

use super::{CurrentUser, Json, Path, Query, ACCESS_COOKIE};

const COOKIE_MAX_AGE: u32 = 60 * 60 * 24;

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

async fn login(
    State(api): State<CargoveraApi>,
    Json(body): Json<UserLogin>,
) -> Result<Response, Error> {
    let outcome = api.login(&body.email, &body.password).await?;
    let cookie = format!(
        "{}={}; HttpOnly; Max-Age={}; SameSite=Lax; Path=/",
        ACCESS_COOKIE, outcome.access_token, COOKIE_MAX_AGE
    );
    let body = json!({
        "message": "Login successful",
        "user": UserMe::from(&outcome.user),
    });
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn get_token(
    State(api): State<CargoveraApi>,
    Json(body): Json<UserLogin>,
) -> Result<Json<TokenResponse>, Error> {
    let outcome = api.login(&body.email, &body.password).await?;
    Ok(Json(TokenResponse {
        access_token: outcome.access_token,
        token_type: "bearer".to_owned(),
    }))
}

async fn logout(CurrentUser(user): CurrentUser) -> Response {
    log::info!("User {} logged out", user.id);
    let cookie = format!(
        "{}=; HttpOnly; Max-Age=0; SameSite=Lax; Path=/",
        ACCESS_COOKIE
    );
    ([(header::SET_COOKIE, cookie)], message("Logged out")).into_response()
}

async fn register(
    State(api): State<CargoveraApi>,
    Json(body): Json<UserRegister>,
) -> Result<Json<Value>, Error> {
    api.register(body).await?;
    Ok(message("Please check your email for verification"))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserMe> {
    Json(UserMe::from(&user))
}

async fn verify(
    State(api): State<CargoveraApi>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<Value>, Error> {
    Ok(message(api.verify_email(&query.token)?))
}

async fn forgot_password(
    State(api): State<CargoveraApi>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, Error> {
    api.forgot_password(&body.email)?;
    Ok(message(
        "If your email is registered, you will receive a reset link.",
    ))
}

async fn reset_password(
    State(api): State<CargoveraApi>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, Error> {
    api.reset_password(&body.token, &body.new_password).await?;
    Ok(message("Password has been reset successfully."))
}

pub fn auth_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/login", post(login))
        .route("/get-token", post(get_token))
        .route("/logout", post(logout))
        .route("/register", post(register))
        .route("/me", get(me))
        .route("/verify", get(verify))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

async fn update_profile(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<UserUpdate>,
) -> Result<Json<UserMe>, Error> {
    Ok(Json(api.update_profile(&user.id.to_string(), body)?))
}

async fn search_users(
    State(api): State<CargoveraApi>,
    CurrentUser(_): CurrentUser,
    Query(search): Query<SearchQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<UserSummary>>, Error> {
    Ok(Json(api.search_users(search.q.as_deref(), &page)?))
}

pub fn user_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/", put(update_profile))
        .route("/search", get(search_users))
}

async fn list_addresses(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Address>>, Error> {
    Ok(Json(api.list_addresses(&user.id.to_string(), &page)?))
}

async fn create_address(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<AddressInput>,
) -> Result<(StatusCode, Json<Address>), Error> {
    let address = api.create_address(&user.id.to_string(), body)?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<AddressInput>,
) -> Result<Json<Address>, Error> {
    Ok(Json(api.update_address(&user.id.to_string(), &id, body)?))
}

async fn delete_address(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    api.delete_address(&user.id.to_string(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn address_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/", get(list_addresses).post(create_address))
        .route("/:id", put(update_address).delete(delete_address))
}

async fn list_webstores(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, Error> {
    let stores = api.list_webstores(&user.id.to_string())?;
    Ok(Json(json!({ "data": stores })))
}

async fn create_webstore(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<WebstoreCreate>,
) -> Result<(StatusCode, Json<Webstore>), Error> {
    let store = api.create_webstore(&user.id.to_string(), body)?;
    Ok((StatusCode::CREATED, Json(store)))
}

async fn update_webstore(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<WebstoreUpdate>,
) -> Result<Json<Webstore>, Error> {
    Ok(Json(api.update_webstore(&user.id.to_string(), &id, body)?))
}

async fn delete_webstore(
    State(api): State<CargoveraApi>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    api.delete_webstore(&user.id.to_string(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn webstore_routes() -> Router<CargoveraApi> {
    Router::new()
        .route("/", get(list_webstores).post(create_webstore))
        .route("/:id", put(update_webstore).delete(delete_webstore))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::api::testing::*;
    use crate::http::testing::*;

    #[tokio::test]
    async fn test_login_sets_cookie() {
        let t = test_api();
        create_user(&t.api, "ada@example.com", false, 0);
        let request = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"email": "ada@example.com", "password": "secret"}).to_string(),
            ))
            .unwrap();
        let response = router(&t).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned();
        assert!(cookie.starts_with("access_token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=86400"));

        let token = cookie
            .trim_start_matches("access_token=")
            .split(';')
            .next()
            .unwrap();
        let request = Request::get("/auth/me")
            .header(header::COOKIE, format!("access_token={}", token))
            .body(Body::empty())
            .unwrap();
        let response = router(&t).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_token_and_me() {
        let t = test_api();
        create_user(&t.api, "ada@example.com", false, 0);
        let app = router(&t);
        let (status, body) = send(
            &app,
            "POST",
            "/auth/get-token",
            None,
            Some(json!({"email": "ada@example.com", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid credentials");

        let (status, body) = send(
            &app,
            "POST",
            "/auth/get-token",
            None,
            Some(json!({"email": "ada@example.com", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");

        let auth = format!("Bearer {}", body["access_token"].as_str().unwrap());
        let (status, me) = send(&app, "GET", "/auth/me", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "ada@example.com");
        assert_eq!(me["balance"], "0.00");
    }

    #[tokio::test]
    async fn test_register_and_forgot_password() {
        let t = test_api();
        let app = router(&t);
        let (status, _) = send(
            &app,
            "POST",
            "/auth/register",
            None,
            Some(json!({"name": "Ada", "email": "ada@example.com", "password": "secret"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({"email": "nobody@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["message"],
            "If your email is registered, you will receive a reset link."
        );

        let (status, body) = send(&app, "GET", "/auth/verify?token=bogus", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_address_lifecycle() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 0);
        let auth = bearer(&t, &ada);
        let app = router(&t);
        let address = json!({
            "alias": "Home",
            "contact_name": "Ada Lovelace",
            "phone": "5551234567",
            "street_line1": "1 Main St",
            "city": "San Francisco",
            "state": "CA",
            "zip_code": "94105",
            "country": "US",
            "is_default": true
        });
        let (status, created) = send(&app, "POST", "/addresses", Some(&auth), Some(address)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, page) = send(&app, "GET", "/addresses", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["data"].as_array().unwrap().len(), 1);

        let uri = format!("/addresses/{}", id);
        let (status, _) = send(&app, "DELETE", &uri, Some(&auth), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "DELETE", &uri, Some(&auth), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Address not found");
    }

    #[tokio::test]
    async fn test_webstores_wrapped_in_data() {
        let t = test_api();
        let ada = create_user(&t.api, "ada@example.com", false, 0);
        let auth = bearer(&t, &ada);
        let app = router(&t);
        let store = json!({
            "store_type": "amazon",
            "name": "Main",
            "store_id": "A1",
            "auth_config": {"key": "value"}
        });
        let (status, _) = send(&app, "POST", "/webstores", Some(&auth), Some(store)).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, "GET", "/webstores", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["name"], "Main");
    }
}
