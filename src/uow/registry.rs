// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory map from work-unit id to its open transaction handle.
//!
//! Rebuilt empty on every start. The lock is only held for the map operation
//! itself, never across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{WorkUnitError, WorkUnitId};
use crate::storage::TransactionHandle;

#[derive(Default)]
pub struct WorkUnitRegistry {
    units: Mutex<HashMap<WorkUnitId, Arc<dyn TransactionHandle>>>,
}

impl WorkUnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn units(&self) -> MutexGuard<'_, HashMap<WorkUnitId, Arc<dyn TransactionHandle>>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Associate `handle` with `id`. Fails if `id` already has a handle.
    pub fn register(
        &self,
        id: WorkUnitId,
        handle: Arc<dyn TransactionHandle>,
    ) -> Result<(), WorkUnitError> {
        let mut units = self.units();
        if units.contains_key(&id) {
            return Err(WorkUnitError::DuplicateWorkUnit(id));
        }
        units.insert(id, handle);
        Ok(())
    }

    pub fn lookup(&self, id: WorkUnitId) -> Result<Arc<dyn TransactionHandle>, WorkUnitError> {
        self.units()
            .get(&id)
            .cloned()
            .ok_or(WorkUnitError::WorkUnitNotFound(id))
    }

    /// Remove the mapping for `id`, returning the handle if there was one.
    pub fn release(&self, id: WorkUnitId) -> Option<Arc<dyn TransactionHandle>> {
        self.units().remove(&id)
    }

    pub fn contains(&self, id: WorkUnitId) -> bool {
        self.units().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.units().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units().is_empty()
    }
}
