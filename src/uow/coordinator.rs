// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction coordinator: begin/commit/rollback of storage transactions
//! keyed by work-unit id.
//!
//! Every operation takes an optional explicit id; when absent the id comes
//! from the ambient context.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::{WorkUnitError, WorkUnitId, WorkUnitRegistry};
use crate::context::{self, AmbientContext};
use crate::storage::{StorageBackend, TransactionHandle};

pub struct TransactionCoordinator {
    backend: Arc<dyn StorageBackend>,
    registry: WorkUnitRegistry,
}

impl TransactionCoordinator {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            registry: WorkUnitRegistry::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn registry(&self) -> &WorkUnitRegistry {
        &self.registry
    }

    fn resolve(id: Option<WorkUnitId>) -> Result<WorkUnitId, WorkUnitError> {
        id.or_else(context::current_work_unit_id)
            .ok_or(WorkUnitError::MissingWorkUnitId)
    }

    /// Open a transaction for the work unit. A no-op when one is already
    /// open under that id.
    pub async fn begin(&self, id: Option<WorkUnitId>) -> Result<WorkUnitId, WorkUnitError> {
        let id = Self::resolve(id)?;
        if self.registry.contains(id) {
            debug!(work_unit_id = %id, "Work unit already open");
            return Ok(id);
        }

        let handle = self.backend.begin().await?;
        if let Err(e) = self.registry.register(id, handle.clone()) {
            // Lost a race against a concurrent begin for the same id.
            if let Err(rollback_err) = handle.rollback().await {
                warn!(work_unit_id = %id, error = %rollback_err, "Failed to discard surplus transaction");
            }
            return Err(e);
        }

        debug!(work_unit_id = %id, "Work unit started");
        Ok(id)
    }

    /// Commit and release the work unit's transaction.
    ///
    /// The handle leaves the registry before the backend commit runs, so it
    /// is released even when the commit fails.
    pub async fn commit(&self, id: Option<WorkUnitId>) -> Result<(), WorkUnitError> {
        let id = Self::resolve(id)?;
        let handle = self
            .registry
            .release(id)
            .ok_or(WorkUnitError::WorkUnitNotFound(id))?;

        handle.commit().await.map_err(|e| {
            error!(work_unit_id = %id, error = %e, "Failed to commit work unit");
            WorkUnitError::Storage(e)
        })?;

        debug!(work_unit_id = %id, "Work unit committed");
        Ok(())
    }

    /// Roll back and release the work unit's transaction.
    pub async fn rollback(&self, id: Option<WorkUnitId>) -> Result<(), WorkUnitError> {
        let id = Self::resolve(id)?;
        let handle = self
            .registry
            .release(id)
            .ok_or(WorkUnitError::WorkUnitNotFound(id))?;

        handle.rollback().await.map_err(|e| {
            error!(work_unit_id = %id, error = %e, "Failed to roll back work unit");
            WorkUnitError::Storage(e)
        })?;

        debug!(work_unit_id = %id, "Work unit rolled back");
        Ok(())
    }

    /// Handle for issuing statements inside the work unit.
    pub fn entity_manager_for(
        &self,
        id: Option<WorkUnitId>,
    ) -> Result<Arc<dyn TransactionHandle>, WorkUnitError> {
        let id = Self::resolve(id)?;
        self.registry.lookup(id)
    }

    pub fn is_active(&self, id: WorkUnitId) -> bool {
        self.registry.contains(id)
    }

    /// Guard that discards the work unit if it is dropped while still armed.
    pub fn guard(&self, id: WorkUnitId) -> WorkUnitGuard<'_> {
        WorkUnitGuard {
            coordinator: self,
            id,
            armed: true,
        }
    }

    /// Run `f` with `ctx` bound, inside the context's work unit.
    ///
    /// A fresh id is assigned when `ctx` carries none. The unit is committed
    /// when `f` succeeds and rolled back when it fails, unless it was already
    /// open before this call, in which case its owner finishes it.
    pub async fn run_in_work_unit<T, E, F, Fut>(&self, mut ctx: AmbientContext, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<WorkUnitError>,
    {
        let id = *ctx.work_unit_id.get_or_insert_with(WorkUnitId::new);

        context::run(ctx, async move {
            if self.registry.contains(id) {
                return f().await;
            }
            self.begin(Some(id)).await?;
            let guard = self.guard(id);

            let result = f().await;
            guard.disarm();

            match result {
                Ok(value) => {
                    self.commit(Some(id)).await?;
                    Ok(value)
                }
                Err(e) => {
                    if let Err(rollback_err) = self.rollback(Some(id)).await {
                        warn!(work_unit_id = %id, error = %rollback_err, "Rollback after failure did not complete");
                    }
                    Err(e)
                }
            }
        })
        .await
    }
}

/// Releases an unfinished work unit when its owner goes away.
///
/// A request future can be dropped (client disconnect, timeout) or unwind
/// from a panic between begin and commit. Dropping an armed guard removes the
/// handle from the registry and rolls its transaction back in the background.
pub struct WorkUnitGuard<'a> {
    coordinator: &'a TransactionCoordinator,
    id: WorkUnitId,
    armed: bool,
}

impl WorkUnitGuard<'_> {
    /// Hand the unit back to explicit commit/rollback.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WorkUnitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(handle) = self.coordinator.registry.release(self.id) else {
            return;
        };

        warn!(work_unit_id = %self.id, "Work unit abandoned before it finished, rolling back");
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.rollback().await {
                        debug!(work_unit_id = %id, error = %e, "Abandoned work unit rollback failed");
                    }
                });
            }
            // Without a runtime the staged writes are dropped with the handle.
            Err(_) => drop(handle),
        }
    }
}
