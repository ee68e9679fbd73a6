// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ambient Context
//!
//! Per-operation values (work-unit id, caller, operation id) carried
//! implicitly through an async call chain.
//!
//! The binding is a tokio task-local attached to the future being polled, not
//! to the worker thread, so operations interleaved on the same runtime never
//! observe each other's values. Spawned tasks start without a binding; pass
//! the context along and call [`run`] again inside them.

mod caller;

use std::future::Future;

use uuid::Uuid;

use crate::uow::WorkUnitId;

pub use caller::Caller;

tokio::task_local! {
    static CURRENT: AmbientContext;
}

/// Values bound for the duration of one logical operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientContext {
    pub work_unit_id: Option<WorkUnitId>,
    pub caller: Caller,
    pub operation_id: Uuid,
}

impl AmbientContext {
    /// Fresh context with a new work-unit id and operation id.
    pub fn new(caller: Caller) -> Self {
        Self {
            work_unit_id: Some(WorkUnitId::new()),
            caller,
            operation_id: Uuid::new_v4(),
        }
    }

    /// Context that carries no work unit (read-only operations).
    pub fn without_work_unit(caller: Caller) -> Self {
        Self {
            work_unit_id: None,
            caller,
            operation_id: Uuid::new_v4(),
        }
    }

    pub fn with_work_unit(mut self, id: WorkUnitId) -> Self {
        self.work_unit_id = Some(id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no ambient context is active")]
    NoActiveContext,
}

/// Poll `fut` with `ctx` bound. The previous binding (if any) is restored
/// when `fut` completes, fails or panics.
pub async fn run<F>(ctx: AmbientContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// Synchronous variant of [`run`].
pub fn sync_scope<R>(ctx: AmbientContext, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(ctx, f)
}

/// The active context, or [`ContextError::NoActiveContext`].
pub fn current_or_fail() -> Result<AmbientContext, ContextError> {
    CURRENT
        .try_with(Clone::clone)
        .map_err(|_| ContextError::NoActiveContext)
}

pub fn current() -> Option<AmbientContext> {
    CURRENT.try_with(Clone::clone).ok()
}

pub fn current_work_unit_id() -> Option<WorkUnitId> {
    CURRENT.try_with(|ctx| ctx.work_unit_id).ok().flatten()
}

pub fn current_caller() -> Option<Caller> {
    CURRENT.try_with(|ctx| ctx.caller.clone()).ok()
}
