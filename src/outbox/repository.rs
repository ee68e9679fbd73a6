// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Event outbox repository.
//!
//! Events are written inside the work unit bound in the ambient context, so
//! they commit or roll back together with the rest of the operation. Reads
//! and the publish flag work on committed state.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::event::{DomainEvent, EVENTS};
use super::OutboxError;
use crate::context;
use crate::storage::{ConstraintKind, Filter, Row, StorageBackend, StoreError};
use crate::uow::TransactionCoordinator;

const ACTION_ID: &str = "actionId";
const IS_PUBLISHED: &str = "isPublished";
const ATTRS: &str = "attrs";

fn event_row(event: &DomainEvent) -> Result<Row, OutboxError> {
    let mut row = Row::new();
    row.insert(ACTION_ID.into(), json!(event.idempotency_key()));
    row.insert(IS_PUBLISHED.into(), json!(false));
    row.insert(ATTRS.into(), Value::String(serde_json::to_string(event)?));
    Ok(row)
}

/// Whether `e` is a unique violation on the events table, i.e. an event with
/// the same idempotency key is already stored.
pub fn is_duplicate_event(e: &StoreError) -> bool {
    e.constraint_violation().is_some_and(|violation| {
        violation.kind == ConstraintKind::Unique && violation.table == EVENTS.name
    })
}

fn payload_of(row: &Row) -> Option<&str> {
    row.get(ATTRS).and_then(Value::as_str)
}

pub struct EventRepository {
    coordinator: Arc<TransactionCoordinator>,
}

impl EventRepository {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self { coordinator }
    }

    fn backend(&self) -> &Arc<dyn StorageBackend> {
        self.coordinator.backend()
    }

    /// Record `event` in the current work unit. Never commits.
    pub async fn add_event(&self, event: &DomainEvent) -> Result<(), OutboxError> {
        let id = context::current_work_unit_id().ok_or(OutboxError::MissingWorkUnitId)?;
        let handle = self.coordinator.entity_manager_for(Some(id))?;
        let key = event.idempotency_key();

        let existing = handle.find(&EVENTS, &Filter::eq(ACTION_ID, key)).await?;
        if !existing.is_empty() {
            return Err(OutboxError::DuplicateEvent(key.to_string()));
        }

        match handle.insert(&EVENTS, event_row(event)?).await {
            Ok(()) => {
                debug!(work_unit_id = %id, action_id = %key, event = %event.name(), "Event staged in outbox");
                Ok(())
            }
            Err(e) => {
                if is_duplicate_event(&e) {
                    return Err(OutboxError::DuplicateEvent(key.to_string()));
                }
                error!(work_unit_id = %id, action_id = %key, error = %e, "Failed to store event");
                Err(OutboxError::Storage(e))
            }
        }
    }

    /// Serialized committed events not yet published, in insertion order.
    pub async fn get_not_published_events(&self) -> Result<Vec<String>, OutboxError> {
        let rows = self
            .backend()
            .find(&EVENTS, &Filter::eq(IS_PUBLISHED, false))
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let payload = payload_of(row);
                if payload.is_none() {
                    warn!(action_id = ?row.get(ACTION_ID), "Skipping outbox row without payload");
                }
                payload.map(str::to_owned)
            })
            .collect())
    }

    /// Same as [`get_not_published_events`](Self::get_not_published_events),
    /// deserialized. Rows that no longer parse are skipped.
    pub async fn not_published_events(&self) -> Result<Vec<DomainEvent>, OutboxError> {
        let payloads = self.get_not_published_events().await?;

        Ok(payloads
            .iter()
            .filter_map(|payload| match serde_json::from_str(payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed outbox event");
                    None
                }
            })
            .collect())
    }

    /// Flag the event as published. Idempotent; unknown keys are ignored.
    pub async fn mark_as_published(&self, key: &str) -> Result<(), OutboxError> {
        let mut changes = Row::new();
        changes.insert(IS_PUBLISHED.into(), json!(true));

        let updated = self
            .backend()
            .update(&EVENTS, &Filter::eq(ACTION_ID, key), changes)
            .await
            .map_err(|e| {
                error!(action_id = %key, error = %e, "Failed to mark event as published");
                OutboxError::Storage(e)
            })?;

        debug!(action_id = %key, updated, "Marked event as published");
        Ok(())
    }

    /// Whether an event with `key` exists. Inside an active work unit this
    /// includes its uncommitted writes.
    pub async fn is_event_exist(&self, key: &str) -> Result<bool, OutboxError> {
        let filter = Filter::eq(ACTION_ID, key);
        let active = context::current_work_unit_id().filter(|id| self.coordinator.is_active(*id));

        let rows = match active {
            Some(id) => {
                let handle = self.coordinator.entity_manager_for(Some(id))?;
                handle.find(&EVENTS, &filter).await?
            }
            None => self.backend().find(&EVENTS, &filter).await?,
        };
        Ok(!rows.is_empty())
    }
}
