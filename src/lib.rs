// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Event Outbox Server - Transactional Event Outbox
//!
//! Domain events are written inside the same storage transaction as the
//! request that produced them and handed to subscribers by a background
//! relay once committed.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - JWT issuing, verification and the request guard
//! - `context` - task-local ambient context (work-unit id, caller)
//! - `outbox` - event repository and relay
//! - `storage` - redb-backed storage with staged transactions
//! - `uow` - work-unit registry, transaction coordinator and middleware

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod outbox;
pub mod state;
pub mod storage;
pub mod uow;

#[cfg(test)]
mod testing;
