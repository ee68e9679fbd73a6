// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use super::WorkUnitId;
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkUnitError {
    #[error("work unit {0} is already registered")]
    DuplicateWorkUnit(WorkUnitId),

    #[error("work unit {0} not found")]
    WorkUnitNotFound(WorkUnitId),

    #[error("no work unit id given and none in the ambient context")]
    MissingWorkUnitId,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
