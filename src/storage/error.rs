// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage errors and structured constraint-violation descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of table constraint that rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintKind {
    Unique,
    NotNull,
}

impl ConstraintKind {
    fn label(self) -> &'static str {
        match self {
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::NotNull => "NOT NULL",
        }
    }
}

/// Structured description of a constraint violation: which constraint, on
/// which `table.column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub table: String,
    pub column: String,
}

/// Message fragments mapped to the constraint they describe, tried in order.
const CONSTRAINT_MESSAGES: [(&str, ConstraintKind); 2] = [
    ("NOT NULL constraint failed", ConstraintKind::NotNull),
    ("UNIQUE constraint failed", ConstraintKind::Unique),
];

impl ConstraintViolation {
    pub fn unique(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            kind: ConstraintKind::Unique,
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn not_null(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            kind: ConstraintKind::NotNull,
            table: table.into(),
            column: column.into(),
        }
    }

    /// Translate a low-level error message such as
    /// `UNIQUE constraint failed: user.age` into its structured form.
    ///
    /// Returns `None` for messages that do not describe a known constraint.
    pub fn parse(message: &str) -> Option<Self> {
        let kind = CONSTRAINT_MESSAGES
            .iter()
            .find(|(fragment, _)| message.contains(fragment))
            .map(|(_, kind)| *kind)?;

        let target = message.split_whitespace().last()?;
        let (table, column) = target.split_once('.')?;
        if table.is_empty() || column.is_empty() {
            return None;
        }

        Some(Self {
            kind,
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} constraint failed: {}.{}",
            self.kind.label(),
            self.table,
            self.column
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("constraint violation: {0}")]
    Constraint(ConstraintViolation),

    #[error("invalid row for table {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    #[error("transaction is already closed")]
    TransactionClosed,

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Structured description of the violated constraint, if this error is
    /// one.
    ///
    /// Falls back to parsing the message, so errors raised by other layers
    /// with the conventional `... constraint failed: table.column` text are
    /// recognised as well.
    pub fn constraint_violation(&self) -> Option<ConstraintViolation> {
        match self {
            StoreError::Constraint(violation) => Some(violation.clone()),
            other => ConstraintViolation::parse(&other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unique_violation() {
        let parsed = ConstraintViolation::parse(
            "QueryFailedError: SQLITE_CONSTRAINT: UNIQUE constraint failed: user.age",
        );
        assert_eq!(parsed, Some(ConstraintViolation::unique("user", "age")));
    }

    #[test]
    fn parses_not_null_violation() {
        let parsed = ConstraintViolation::parse(
            "QueryFailedError: SQLITE_CONSTRAINT: NOT NULL constraint failed: event.attrs",
        );
        assert_eq!(parsed, Some(ConstraintViolation::not_null("event", "attrs")));
    }

    #[test]
    fn unrelated_message_is_not_a_violation() {
        assert_eq!(ConstraintViolation::parse("connection reset by peer"), None);
        assert_eq!(
            ConstraintViolation::parse("UNIQUE constraint failed: no_column"),
            None
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        let violation = ConstraintViolation::not_null("events", "attrs");
        let error = StoreError::Constraint(violation.clone());
        assert_eq!(
            error.to_string(),
            "constraint violation: NOT NULL constraint failed: events.attrs"
        );
        assert_eq!(ConstraintViolation::parse(&error.to_string()), Some(violation));
    }

    #[test]
    fn constraint_violation_accessor() {
        let error = StoreError::Constraint(ConstraintViolation::unique("events", "actionId"));
        assert_eq!(
            error.constraint_violation(),
            Some(ConstraintViolation::unique("events", "actionId"))
        );
        assert_eq!(StoreError::TransactionClosed.constraint_violation(), None);
    }

    #[test]
    fn kind_serializes_as_kebab_case() {
        let json = serde_json::to_value(ConstraintViolation::not_null("t", "c")).unwrap();
        assert_eq!(json["kind"], "not-null");
    }
}
