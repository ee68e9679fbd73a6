// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Self-issued JWT authentication.
//!
//! ## Auth Flow
//!
//! 1. The service issues an access/refresh pair with [`TokenManager::create_tokens`]
//! 2. Clients send `Authorization: Bearer <access token>`
//! 3. [`guard::jwt_guard`]:
//!    - verifies signature (RS512 by default), `exp` and `nbf` with no leeway
//!    - checks the claim shape (`tokenType`, `payload.userId`)
//!    - rejects anything but an access token
//!    - attaches the resulting [`Caller`](crate::context::Caller) to the request
//!
//! Requests without a header proceed as anonymous callers.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod manager;

pub use claims::{JwtPayload, JwtTokens, TokenClaims, TokenKind};
pub use error::{InvalidTokenError, TokenError, TokenVerificationError};
pub use extractor::CurrentCaller;
pub use guard::jwt_guard;
pub use manager::{JsonWebTokenManager, TokenManager};
