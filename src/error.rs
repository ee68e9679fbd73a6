// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::outbox::{is_duplicate_event, OutboxError};
use crate::uow::WorkUnitError;

/// API error rendered in the `{success: false, payload: {...}}` envelope
/// shared with the token guard.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_type: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    payload: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "ConflictError", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "ValidationError", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            success: false,
            payload: ErrorPayload {
                error_type: self.error_type,
                message: self.message,
            },
        });
        (self.status, body).into_response()
    }
}

impl From<WorkUnitError> for ApiError {
    fn from(e: WorkUnitError) -> Self {
        match e {
            // Another work unit committed the same event first.
            WorkUnitError::Storage(ref store) if is_duplicate_event(store) => {
                tracing::warn!(error = %e, "Work unit lost a duplicate event race");
                ApiError::conflict("event already recorded")
            }
            _ => {
                tracing::error!(error = %e, "Work unit failure");
                ApiError::internal("transaction failure")
            }
        }
    }
}

impl From<OutboxError> for ApiError {
    fn from(e: OutboxError) -> Self {
        match e {
            OutboxError::DuplicateEvent(key) => {
                ApiError::conflict(format!("event {key} already recorded"))
            }
            OutboxError::Serialization(e) => ApiError::unprocessable(e.to_string()),
            other => {
                tracing::error!(error = %other, "Outbox failure");
                ApiError::internal("storage failure")
            }
        }
    }
}
