// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer-token guard for Axum.
//!
//! Resolves the [`Caller`] of every request and stores it in the request
//! extensions:
//!
//! - no `Authorization` header (or an empty token) → [`Caller::AnonymousUser`]
//! - valid access token → [`Caller::DomainUser`]
//! - anything else → `400` [`InvalidTokenError`], the handler never runs
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/protected", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), jwt_guard));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::claims::TokenKind;
use super::error::{InvalidTokenError, TokenVerificationError};
use super::manager::TokenManager;
use crate::context::Caller;
use crate::state::AppState;

/// Raw token from the header value: the first `Bearer ` is removed.
fn raw_token(header_value: &str) -> String {
    header_value.replacen("Bearer ", "", 1)
}

/// Resolve the caller for an optional `Authorization` header value.
pub fn authenticate(
    tokens: &dyn TokenManager,
    header_value: Option<&str>,
) -> Result<Caller, InvalidTokenError> {
    let token = match header_value.map(raw_token) {
        Some(token) if !token.is_empty() => token,
        _ => return Ok(Caller::AnonymousUser),
    };

    match tokens.verify_token(&token, TokenKind::Access) {
        Ok(payload) => Ok(Caller::DomainUser {
            user_id: payload.user_id,
        }),
        Err(reason) => Err(InvalidTokenError {
            raw_token: token,
            reason,
        }),
    }
}

/// Authentication middleware function.
pub async fn jwt_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value = match request.headers().get(AUTHORIZATION) {
        Some(value) => match value.to_str() {
            Ok(s) => Some(s.to_owned()),
            Err(_) => {
                return InvalidTokenError {
                    raw_token: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    reason: TokenVerificationError::Malformed,
                }
                .into_response()
            }
        },
        None => None,
    };

    match authenticate(state.tokens.as_ref(), header_value.as_deref()) {
        Ok(caller) => {
            if let Some(user_id) = caller.user_id() {
                tracing::debug!(user_id = %user_id, "Authenticated request");
            }
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(rejection) => {
            tracing::debug!(reason = rejection.reason.kind(), "Rejected bearer token");
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CurrentCaller, JwtPayload};
    use crate::testing;
    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const USER_ID: &str = "6c901af3-619c-4a45-9f27-0dfcb900e53c";

    fn app(state: AppState) -> Router {
        async fn whoami(CurrentCaller(caller): CurrentCaller) -> Json<Caller> {
            Json(caller)
        }

        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), jwt_guard))
            .with_state(state)
    }

    async fn call(state: &AppState, authorization: Option<String>) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app(state.clone())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn valid_access_token_yields_domain_user() {
        let (state, _dir) = testing::test_state();
        let tokens = state
            .tokens
            .create_tokens(&JwtPayload {
                user_id: USER_ID.into(),
                employee_id: Some("fbe91cc3-ff21-4b13-aff2-916d1b793ff5".into()),
            })
            .unwrap();

        let (status, body) = call(&state, Some(format!("Bearer {}", tokens.access_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"type": "DomainUser", "userId": USER_ID}));
    }

    #[tokio::test]
    async fn no_header_is_anonymous() {
        let (state, _dir) = testing::test_state();
        let (status, body) = call(&state, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"type": "AnonymousUser"}));

        let (status, body) = call(&state, Some("Bearer ".into())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "AnonymousUser");
    }

    #[tokio::test]
    async fn refresh_token_is_rejected() {
        let (state, _dir) = testing::test_state();
        let tokens = state
            .tokens
            .create_tokens(&JwtPayload::for_user(USER_ID))
            .unwrap();

        let (status, body) = call(&state, Some(format!("Bearer {}", tokens.refresh_token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["payload"]["type"], "InvalidTokenError");
        assert_eq!(body["payload"]["details"]["rawToken"], tokens.refresh_token);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let (state, _dir) = testing::test_state();
        let (status, body) = call(&state, Some("Bearer 4534523452345".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["payload"]["details"]["rawToken"], "4534523452345");
    }

    #[test]
    fn token_without_bearer_prefix_is_still_verified() {
        let tokens = testing::token_manager();
        let issued = tokens.create_tokens(&JwtPayload::for_user(USER_ID)).unwrap();
        assert_eq!(
            authenticate(tokens.as_ref(), Some(issued.access_token.as_str())),
            Ok(Caller::domain_user(USER_ID))
        );
    }
}
