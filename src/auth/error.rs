// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token errors and the HTTP response for rejected tokens.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::claims::TokenKind;

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerificationError {
    /// `exp` is in the past
    Expired,
    /// `nbf` is in the future
    NotYetValid,
    /// Bad encoding, bad signature or wrong algorithm
    Malformed,
    /// Valid token of the other kind
    WrongKind { given: TokenKind, expected: TokenKind },
    /// Signature is fine but the claims do not have the expected shape
    InvalidPayload,
}

impl TokenVerificationError {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenVerificationError::Expired => "expired",
            TokenVerificationError::NotYetValid => "not-yet-valid",
            TokenVerificationError::Malformed => "malformed",
            TokenVerificationError::WrongKind { .. } => "wrong-kind",
            TokenVerificationError::InvalidPayload => "invalid-payload",
        }
    }
}

impl std::fmt::Display for TokenVerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenVerificationError::Expired => write!(f, "Token has expired"),
            TokenVerificationError::NotYetValid => write!(f, "Token is not yet valid"),
            TokenVerificationError::Malformed => write!(f, "Token is malformed"),
            TokenVerificationError::WrongKind { given, expected } => {
                write!(f, "Expected a {expected} token, got a {given} token")
            }
            TokenVerificationError::InvalidPayload => write!(f, "Token payload is invalid"),
        }
    }
}

impl std::error::Error for TokenVerificationError {}

/// Failures while issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid key material: {0}")]
    Key(jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// Rejection produced by the guard: always `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTokenError {
    pub raw_token: String,
    pub reason: TokenVerificationError,
}

#[derive(Serialize)]
struct InvalidTokenBody {
    success: bool,
    payload: InvalidTokenPayload,
}

#[derive(Serialize)]
struct InvalidTokenPayload {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
    details: InvalidTokenDetails,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidTokenDetails {
    raw_token: String,
    reason: &'static str,
}

impl IntoResponse for InvalidTokenError {
    fn into_response(self) -> Response {
        let body = Json(InvalidTokenBody {
            success: false,
            payload: InvalidTokenPayload {
                error_type: "InvalidTokenError",
                message: "Unable to decode the token: invalid format".to_string(),
                details: InvalidTokenDetails {
                    raw_token: self.raw_token,
                    reason: self.reason.kind(),
                },
            },
        });
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(TokenVerificationError::Expired.kind(), "expired");
        assert_eq!(TokenVerificationError::NotYetValid.kind(), "not-yet-valid");
        assert_eq!(TokenVerificationError::Malformed.kind(), "malformed");
        assert_eq!(TokenVerificationError::InvalidPayload.kind(), "invalid-payload");
        let wrong = TokenVerificationError::WrongKind {
            given: TokenKind::Refresh,
            expected: TokenKind::Access,
        };
        assert_eq!(wrong.kind(), "wrong-kind");
        assert_eq!(wrong.to_string(), "Expected a access token, got a refresh token");
    }

    #[tokio::test]
    async fn invalid_token_returns_400_envelope() {
        let response = InvalidTokenError {
            raw_token: "4534523452345".into(),
            reason: TokenVerificationError::Malformed,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["payload"]["type"], "InvalidTokenError");
        assert_eq!(body["payload"]["details"]["rawToken"], "4534523452345");
        assert_eq!(body["payload"]["details"]["reason"], "malformed");
    }
}
