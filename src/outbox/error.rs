// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::storage::StoreError;
use crate::uow::WorkUnitError;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("no work unit is active in the ambient context")]
    MissingWorkUnitId,

    #[error("event with idempotency key {0} already exists")]
    DuplicateEvent(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    WorkUnit(#[from] WorkUnitError),
}
