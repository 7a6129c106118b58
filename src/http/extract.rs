// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::api::CargoveraApi;
use crate::error::Error;
use crate::model::user::User;

/// Cookie holding the access token of browser sessions.
pub const ACCESS_COOKIE: &str = "access_token";

/// Authenticated caller.
pub struct CurrentUser(pub User);

/// Authenticated administrator.
pub struct AdminUser(pub User);

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_owned())
        .filter(|value| !value.is_empty())
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }
    Some(token.trim().to_owned())
}

#[axum::async_trait]
impl FromRequestParts<CargoveraApi> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, api: &CargoveraApi) -> Result<Self, Error> {
        let token = cookie_token(parts)
            .or_else(|| bearer_token(parts))
            .ok_or_else(|| Error::Unauthorized("Not authenticated".to_owned()))?;
        api.authenticate(&token).map(CurrentUser)
    }
}

#[axum::async_trait]
impl FromRequestParts<CargoveraApi> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, api: &CargoveraApi) -> Result<Self, Error> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, api).await?;
        if !user.is_admin {
            return Err(Error::Forbidden("Admin privileges required".to_owned()));
        }
        Ok(AdminUser(user))
    }
}

/// JSON body and response. A malformed body is rejected as `{"detail"}`.
pub struct Json<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Error> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Query string parameters.
pub struct Query<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Error> {
        let axum::extract::Query(value) =
            axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Query(value))
    }
}

/// Path parameters.
pub struct Path<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Error> {
        let axum::extract::Path(value) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Path(value))
    }
}
