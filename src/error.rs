// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Cargovera errors.
//!
//! This module contains the different errors that can be returned by the service.
//! Every variant maps to an HTTP status code and is rendered as `{"detail": "..."}`.
//!

use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::model::money::Money;

/// Cargovera errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid request parameter or business rule violation.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),
    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Resource already exists.
    #[error("{0}")]
    Conflict(String),
    /// Uploaded payload too large.
    #[error("{0}")]
    PayloadTooLarge(String),
    /// Balance does not cover the requested purchase.
    #[error(
        "Insufficient balance: {} available, {} required",
        .balance.to_decimal_string(),
        .required.to_decimal_string()
    )]
    InsufficientBalance { balance: Money, required: Money },
    /// Negative money amount.
    #[error("Negative amount {} not accepted", .0.to_decimal_string())]
    NegativeAmount(Money),
    /// Carrier not supported for the operation.
    #[error("Unsupported carrier: {0}")]
    UnsupportedCarrier(String),
    /// No carrier rate for the requested service.
    #[error("No rates available for requested service type: {0}")]
    RateNotAvailable(String),
    /// Entity is not in the status required by the operation.
    #[error("{0}")]
    InconsistentStatus(String),
    /// Database error
    #[error("{0}")]
    Database(String),
    /// Database constraint violation.
    #[error("{0}")]
    Constraint(String),
    /// External service rejected the request (4xx).
    #[error("{0}")]
    ExternalClient(String),
    /// External service failed (5xx).
    #[error("{0}")]
    ExternalServer(String),
    /// External service unreachable or returned garbage.
    #[error("{0}")]
    External(String),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Internal error.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code of the error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_)
            | Error::InsufficientBalance { .. }
            | Error::NegativeAmount(_)
            | Error::UnsupportedCarrier(_)
            | Error::RateNotAvailable(_)
            | Error::InconsistentStatus(_)
            | Error::ExternalClient(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) | Error::Constraint(_) => StatusCode::CONFLICT,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ExternalServer(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::External(_) | Error::Config(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a retry of the failed carrier call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ExternalServer(_) | Error::External(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Constraint(
                    msg.clone()
                        .unwrap_or_else(|| "Database integrity error".to_owned()),
                )
            }
            e => Error::Database(format!("Database error: {}", e)),
        }
    }
}

impl Error {
    fn rejected(status: StatusCode, text: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge(text)
        } else {
            Error::BadRequest(text)
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for Error {
    fn from(rejection: MultipartRejection) -> Self {
        Error::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::External(format!("Request failed: {}", error))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Internal(format!("Serialization error: {}", error))
    }
}
