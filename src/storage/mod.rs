// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistence for the outbox, backed by **redb** (pure Rust, ACID).
//!
//! ## Layers
//!
//! - [`backend`]: narrow capability traits ([`StorageBackend`],
//!   [`TransactionHandle`]) the coordinator and repositories are written
//!   against
//! - [`redb_backend`]: the embedded implementation with staged transactions
//! - [`error`]: [`StoreError`] and structured [`ConstraintViolation`]s
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   outbox.redb     # events table + insertion sequences
//! ```

pub mod backend;
pub mod error;
pub mod redb_backend;

pub use backend::{Filter, Row, StorageBackend, TableSchema, TransactionHandle};
pub use error::{ConstraintKind, ConstraintViolation, StoreError, StoreResult};
pub use redb_backend::{RedbBackend, RedbTransaction};

/// File name of the redb database under the data directory.
pub const DATABASE_FILE: &str = "outbox.redb";
