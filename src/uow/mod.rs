// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Units of Work
//!
//! A work unit is one open storage transaction identified by a
//! [`WorkUnitId`]. The [`WorkUnitRegistry`] owns the id → handle map, the
//! [`TransactionCoordinator`] drives begin/commit/rollback, and
//! [`middleware::work_unit_scope`] wraps every API request in its own unit.

pub mod coordinator;
pub mod error;
pub mod middleware;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use coordinator::TransactionCoordinator;
pub use error::WorkUnitError;
pub use middleware::work_unit_scope;
pub use registry::WorkUnitRegistry;

/// Identifier of a unit of work (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnitId(Uuid);

impl WorkUnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WorkUnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for WorkUnitId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for WorkUnitId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for WorkUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
