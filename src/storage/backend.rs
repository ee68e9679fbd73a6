// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage capability traits.
//!
//! The coordinator and the outbox only need a narrow surface: open a
//! transaction, issue statements against it, commit or roll it back, and run
//! plain autocommitted reads/updates outside of any work unit.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::{ConstraintViolation, StoreError, StoreResult};

/// A stored row: a JSON object keyed by column name.
pub type Row = Map<String, Value>;

/// Static description of a table and its constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub primary_key: &'static str,
    /// Columns (besides the primary key) whose values must be unique.
    pub unique: &'static [&'static str],
    /// Columns that must be present and non-null.
    pub not_null: &'static [&'static str],
    /// Columns with an equality index. Filters on them scan only the
    /// matching rows.
    pub indexed: &'static [&'static str],
}

/// Storage key for a column value: strings as-is, anything else as JSON.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TableSchema {
    /// Primary key value of `row` as a string key.
    pub fn primary_key_of(&self, row: &Row) -> StoreResult<String> {
        match row.get(self.primary_key) {
            Some(Value::Null) | None => Err(StoreError::Constraint(
                ConstraintViolation::not_null(self.name, self.primary_key),
            )),
            Some(value) => Ok(key_string(value)),
        }
    }

    pub fn check_not_null(&self, row: &Row) -> StoreResult<()> {
        for column in self.not_null {
            if row.get(*column).is_none_or(Value::is_null) {
                return Err(StoreError::Constraint(ConstraintViolation::not_null(
                    self.name, *column,
                )));
            }
        }
        Ok(())
    }

    /// Check `row` (stored under `key`) against every other row in `existing`.
    pub fn check_unique<'a>(
        &self,
        key: &str,
        row: &Row,
        existing: impl IntoIterator<Item = (&'a str, &'a Row)>,
    ) -> StoreResult<()> {
        for (other_key, other) in existing {
            if other_key == key {
                return Err(StoreError::Constraint(ConstraintViolation::unique(
                    self.name,
                    self.primary_key,
                )));
            }
            for column in self.unique {
                let value = row.get(*column).filter(|v| !v.is_null());
                if value.is_some() && value == other.get(*column) {
                    return Err(StoreError::Constraint(ConstraintViolation::unique(
                        self.name, *column,
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Equality conditions over row columns, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(column, value)
    }

    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    /// Value required for `column`, if the filter constrains it.
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.conditions
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, value)| value)
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

/// An open transaction. Writes are visible to `find` on the same handle
/// before commit and to nobody else.
#[async_trait]
pub trait TransactionHandle: Send + Sync {
    async fn insert(&self, table: &TableSchema, row: Row) -> StoreResult<()>;

    /// Merge `changes` into every matching row. Returns the number of rows
    /// updated.
    async fn update(&self, table: &TableSchema, filter: &Filter, changes: Row)
        -> StoreResult<u64>;

    async fn find(&self, table: &TableSchema, filter: &Filter) -> StoreResult<Vec<Row>>;

    async fn commit(&self) -> StoreResult<()>;

    async fn rollback(&self) -> StoreResult<()>;

    fn is_open(&self) -> bool;
}

/// Entry point to a storage engine.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn begin(&self) -> StoreResult<Arc<dyn TransactionHandle>>;

    /// Read committed rows, in insertion order.
    async fn find(&self, table: &TableSchema, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// Autocommitted update outside any work unit.
    async fn update(&self, table: &TableSchema, filter: &Filter, changes: Row)
        -> StoreResult<u64>;

    /// Cheap round trip to the engine, used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USERS: TableSchema = TableSchema {
        name: "user",
        primary_key: "id",
        unique: &["age"],
        not_null: &["name"],
        indexed: &[],
    };

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn filter_matches_all_conditions() {
        let r = row(json!({"id": "1", "isPublished": false, "name": "a"}));
        assert!(Filter::all().matches(&r));
        assert!(Filter::eq("isPublished", false).matches(&r));
        assert!(!Filter::eq("isPublished", false).and("id", "2").matches(&r));
    }

    #[test]
    fn filter_exposes_required_values() {
        let filter = Filter::eq("isPublished", false).and("id", "7");
        assert_eq!(filter.value_of("id"), Some(&json!("7")));
        assert_eq!(filter.value_of("name"), None);
        assert_eq!(key_string(&json!("K1")), "K1");
        assert_eq!(key_string(&json!(false)), "false");
    }

    #[test]
    fn not_null_rejects_missing_and_null() {
        let missing = row(json!({"id": "1"}));
        let null = row(json!({"id": "1", "name": null}));
        for r in [missing, null] {
            let err = USERS.check_not_null(&r).unwrap_err();
            assert_eq!(
                err.constraint_violation(),
                Some(ConstraintViolation::not_null("user", "name"))
            );
        }
    }

    #[test]
    fn unique_rejects_same_key_and_same_column() {
        let existing = row(json!({"id": "1", "name": "a", "age": 30}));
        let same_key = row(json!({"id": "1", "name": "b", "age": 31}));
        let same_age = row(json!({"id": "2", "name": "b", "age": 30}));
        let fine = row(json!({"id": "3", "name": "c", "age": 40}));

        let err = USERS
            .check_unique("1", &same_key, [("1", &existing)])
            .unwrap_err();
        assert_eq!(
            err.constraint_violation(),
            Some(ConstraintViolation::unique("user", "id"))
        );

        let err = USERS
            .check_unique("2", &same_age, [("1", &existing)])
            .unwrap_err();
        assert_eq!(
            err.constraint_violation(),
            Some(ConstraintViolation::unique("user", "age"))
        );

        assert!(USERS.check_unique("3", &fine, [("1", &existing)]).is_ok());
    }
}
