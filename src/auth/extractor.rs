// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller extractor for handlers behind the guard.
//!
//! ```rust,ignore
//! async fn my_handler(CurrentCaller(caller): CurrentCaller) -> impl IntoResponse {
//!     // caller is AnonymousUser or DomainUser
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::context::Caller;

/// Caller resolved by [`jwt_guard`](super::guard::jwt_guard); anonymous when
/// the guard did not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentCaller(pub Caller);

impl<S> FromRequestParts<S> for CurrentCaller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentCaller(
            parts.extensions.get::<Caller>().cloned().unwrap_or_default(),
        ))
    }
}
