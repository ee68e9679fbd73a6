// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request-scoped work units.
//!
//! Every request routed through [`work_unit_scope`] gets a fresh ambient
//! context and its own storage transaction. The transaction commits when the
//! handler answers with a 2xx/3xx status and rolls back otherwise. A request
//! dropped before the handler answers rolls back too.
//!
//! ```rust,ignore
//! let v1 = Router::new()
//!     .route("/events", post(record_event))
//!     .layer(middleware::from_fn_with_state(state.clone(), work_unit_scope));
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn, Instrument};

use crate::context::{self, AmbientContext, Caller};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn work_unit_scope(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let caller = request
        .extensions()
        .get::<Caller>()
        .cloned()
        .unwrap_or_default();
    let ctx = AmbientContext::new(caller);
    let span = tracing::debug_span!("work_unit", operation_id = %ctx.operation_id);

    let coordinator = state.coordinator.clone();
    let id = match coordinator.begin(ctx.work_unit_id).await {
        Ok(id) => id,
        Err(e) => return ApiError::from(e).into_response(),
    };
    let guard = coordinator.guard(id);

    let response = context::run(ctx, next.run(request))
        .instrument(span)
        .await;
    guard.disarm();

    let status = response.status();
    if status.is_success() || status.is_redirection() {
        if let Err(e) = coordinator.commit(Some(id)).await {
            return ApiError::from(e).into_response();
        }
        debug!(work_unit_id = %id, status = status.as_u16(), "Request committed");
    } else {
        if let Err(e) = coordinator.rollback(Some(id)).await {
            warn!(work_unit_id = %id, error = %e, "Failed to roll back request work unit");
        }
        debug!(work_unit_id = %id, status = status.as_u16(), "Request rolled back");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::EVENTS;
    use crate::storage::Filter;
    use crate::testing;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::post,
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        async fn record(State(state): State<AppState>) -> StatusCode {
            state
                .events
                .add_event(&testing::sample_event("k-ok"))
                .await
                .unwrap();
            StatusCode::CREATED
        }

        async fn record_then_fail(State(state): State<AppState>) -> StatusCode {
            state
                .events
                .add_event(&testing::sample_event("k-fail"))
                .await
                .unwrap();
            StatusCode::UNPROCESSABLE_ENTITY
        }

        async fn record_then_hang(State(state): State<AppState>) -> StatusCode {
            state
                .events
                .add_event(&testing::sample_event("k-hang"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::CREATED
        }

        // Records an event while another work unit commits the same key.
        async fn record_racing(State(state): State<AppState>) -> StatusCode {
            state
                .events
                .add_event(&testing::sample_event("k-race"))
                .await
                .unwrap();

            let rival = tokio::spawn(async move {
                let event = testing::sample_event("k-race");
                let ctx = AmbientContext::new(Caller::AnonymousUser);
                state
                    .coordinator
                    .run_in_work_unit(ctx, || state.events.add_event(&event))
                    .await
            });
            rival.await.unwrap().unwrap();
            StatusCode::CREATED
        }

        Router::new()
            .route("/ok", post(record))
            .route("/fail", post(record_then_fail))
            .route("/hang", post(record_then_hang))
            .route("/race", post(record_racing))
            .layer(middleware::from_fn_with_state(state.clone(), work_unit_scope))
            .with_state(state)
    }

    fn request(path: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    async fn call(state: &AppState, path: &str) -> StatusCode {
        app(state.clone())
            .oneshot(request(path))
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn success_commits_the_work_unit() {
        let (state, _dir) = testing::test_state();
        assert_eq!(call(&state, "/ok").await, StatusCode::CREATED);

        let rows = state
            .coordinator
            .backend()
            .find(&EVENTS, &Filter::all())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(state.coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn error_status_rolls_back() {
        let (state, _dir) = testing::test_state();
        assert_eq!(call(&state, "/fail").await, StatusCode::UNPROCESSABLE_ENTITY);

        assert!(!state.events.is_event_exist("k-fail").await.unwrap());
        assert!(state.coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn dropped_request_releases_its_work_unit() {
        let (state, _dir) = testing::test_state();

        for _ in 0..3 {
            let pending = app(state.clone()).oneshot(request("/hang"));
            assert!(tokio::time::timeout(Duration::from_millis(50), pending)
                .await
                .is_err());
        }

        assert!(state.coordinator.registry().is_empty());
        assert!(!state.events.is_event_exist("k-hang").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_committed_concurrently_is_a_conflict() {
        let (state, _dir) = testing::test_state();
        assert_eq!(call(&state, "/race").await, StatusCode::CONFLICT);

        assert!(state.events.is_event_exist("k-race").await.unwrap());
        assert!(state.coordinator.registry().is_empty());
    }
}
