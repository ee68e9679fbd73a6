// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{jwt_guard, JwtPayload, JwtTokens, TokenKind},
    outbox::{AggregateMeta, AggregateSnapshot, DomainEvent, EventMeta},
    state::AppState,
    uow::work_unit_scope,
};

pub mod events;
pub mod health;

pub fn router(state: AppState) -> Router {
    // Layers run bottom-up: the guard resolves the caller before the work
    // unit is opened.
    let v1_routes = Router::new()
        .route("/events", post(events::record_event))
        .route("/events/pending", get(events::pending_events))
        .route("/events/{action_id}/published", post(events::mark_published))
        .route("/events/{action_id}/exists", get(events::event_exists))
        .layer(middleware::from_fn_with_state(state.clone(), work_unit_scope))
        .layer(middleware::from_fn_with_state(state.clone(), jwt_guard));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        events::record_event,
        events::pending_events,
        events::mark_published,
        events::event_exists
    ),
    components(
        schemas(
            DomainEvent,
            EventMeta,
            AggregateSnapshot,
            AggregateMeta,
            events::ExistsResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            JwtPayload,
            JwtTokens,
            TokenKind
        )
    ),
    tags(
        (name = "Health", description = "Liveness and storage checks"),
        (name = "Events", description = "Transactional event outbox")
    )
)]
pub struct ApiDoc;
