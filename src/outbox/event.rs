// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Domain event model and its outbox table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::context::Caller;
use crate::storage::TableSchema;

/// Outbox table: one row per event, keyed by idempotency key.
///
/// Columns: `actionId` (primary key), `isPublished`, `attrs` (the whole
/// serialized event).
pub const EVENTS: TableSchema = TableSchema {
    name: "events",
    primary_key: "actionId",
    unique: &[],
    not_null: &["isPublished", "attrs"],
    indexed: &["isPublished"],
};

/// One fact that occurred while processing an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Event attributes.
    #[schema(value_type = Object)]
    pub attrs: Value,
    pub meta: EventMeta,
    /// Identity the originating operation ran as.
    #[schema(value_type = Object)]
    pub caller: Caller,
    /// Snapshot of the aggregate root after the change.
    #[serde(rename = "aRootAttrs")]
    pub aggregate: AggregateSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub event_id: String,
    /// Id of the operation that emitted the event; the idempotency key.
    pub action_id: String,
    pub name: String,
    pub module_name: String,
    pub domain_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregateSnapshot {
    #[schema(value_type = Object)]
    pub attrs: Value,
    pub meta: AggregateMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMeta {
    pub name: String,
    pub domain_type: String,
    pub version: u64,
}

impl DomainEvent {
    pub fn idempotency_key(&self) -> &str {
        &self.meta.action_id
    }

    pub fn event_id(&self) -> &str {
        &self.meta.event_id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn source_module(&self) -> &str {
        &self.meta.module_name
    }
}
