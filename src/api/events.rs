// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{auth::CurrentCaller, error::ApiError, outbox::DomainEvent, state::AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Record a domain event in the request's work unit.
///
/// The event's caller is replaced with the authenticated caller.
#[utoipa::path(
    post,
    path = "/v1/events",
    request_body = DomainEvent,
    tag = "Events",
    responses(
        (status = 201, body = DomainEvent),
        (status = 400, description = "Invalid bearer token"),
        (status = 409, description = "Event with this action id already recorded")
    ),
    security(("bearer_auth" = []))
)]
pub async fn record_event(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Json(mut event): Json<DomainEvent>,
) -> Result<(StatusCode, Json<DomainEvent>), ApiError> {
    event.caller = caller;
    state.events.add_event(&event).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Serialized events not yet handed to the relay, oldest first.
#[utoipa::path(
    get,
    path = "/v1/events/pending",
    tag = "Events",
    responses((status = 200, body = [String]))
)]
pub async fn pending_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.events.get_not_published_events().await?))
}

#[utoipa::path(
    post,
    path = "/v1/events/{action_id}/published",
    params(
        ("action_id" = String, Path, description = "Idempotency key of the event")
    ),
    tag = "Events",
    responses((status = 204))
)]
pub async fn mark_published(
    Path(action_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.events.mark_as_published(&action_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/events/{action_id}/exists",
    params(
        ("action_id" = String, Path, description = "Idempotency key of the event")
    ),
    tag = "Events",
    responses((status = 200, body = ExistsResponse))
)]
pub async fn event_exists(
    Path(action_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExistsResponse>, ApiError> {
    let exists = state.events.is_event_exist(&action_id).await?;
    Ok(Json(ExistsResponse { exists }))
}
