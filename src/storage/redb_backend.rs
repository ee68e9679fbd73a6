// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! redb implementation of the storage capability traits.
//!
//! ## Table Layout
//!
//! - one table per [`TableSchema`]: primary key → JSON `{seq, row}`
//! - `row_order`: `table | seq` → primary key
//! - `column_index`: `table | column | value | seq` → primary key, for the
//!   schema's `indexed` columns
//! - `unique_index`: `table | column | value` → primary key, for the
//!   schema's `unique` columns
//! - `__sequences`: table name → last assigned insertion sequence
//!
//! Key parts are NUL-terminated and sequences are big-endian, so a prefix
//! range scan yields primary keys in insertion order. Reads pinned to a
//! primary key or an indexed column never touch unrelated rows.
//!
//! ## Transactions
//!
//! redb allows a single writer at a time, so a [`RedbTransaction`] does not
//! hold a redb write transaction while it is open. Statements are staged in
//! memory (visible to the handle's own reads) and applied atomically inside
//! one write transaction at commit, where every constraint is checked again
//! against the then-committed state.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use redb::{
    Database, ReadableDatabase, ReadableTable, Table, TableDefinition, TableError,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::backend::{key_string, Filter, Row, StorageBackend, TableSchema, TransactionHandle};
use super::error::{ConstraintViolation, StoreError, StoreResult};

/// Table name → last assigned insertion sequence.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("__sequences");

/// `table | seq` → primary key.
const ROW_ORDER: TableDefinition<&[u8], &str> = TableDefinition::new("row_order");

/// `table | column | value | seq` → primary key.
const COLUMN_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("column_index");

/// `table | column | value` → primary key.
const UNIQUE_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("unique_index");

fn rows_table(schema: &TableSchema) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(schema.name)
}

/// Row as persisted, with its insertion sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRow {
    seq: u64,
    row: Row,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

const KEY_SEPARATOR: u8 = 0;

/// Build a prefix key: every part followed by a NUL byte.
fn make_prefix(parts: &[&str]) -> Vec<u8> {
    let len = parts.iter().map(|part| part.len() + 1).sum::<usize>();
    let mut key = Vec::with_capacity(len + 8);
    for part in parts {
        key.extend_from_slice(part.as_bytes());
        key.push(KEY_SEPARATOR);
    }
    key
}

/// Build the upper bound for a range scan over every sequenced key under
/// `prefix`.
fn make_prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = Vec::with_capacity(prefix.len() + 9);
    end.extend_from_slice(prefix);
    end.extend_from_slice(&[0xFF; 9]);
    end
}

fn make_sequenced_key(parts: &[&str], seq: u64) -> Vec<u8> {
    let mut key = make_prefix(parts);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Index form of a column value. JSON text never contains a raw NUL, so it
/// cannot run into the next key part. Nulls are not indexed.
fn index_value(value: Option<&Value>) -> Option<String> {
    value.filter(|v| !v.is_null()).map(Value::to_string)
}

// =============================================================================
// Row Helpers
// =============================================================================

fn get_row(
    rows: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> StoreResult<Option<StoredRow>> {
    match rows.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Primary keys stored under `prefix`, in key order.
fn scan_prefix(
    index: &impl ReadableTable<&'static [u8], &'static str>,
    prefix: &[u8],
) -> StoreResult<Vec<String>> {
    let end = make_prefix_end(prefix);
    let mut keys = Vec::new();
    for entry in index.range(prefix..end.as_slice())? {
        let (_, key) = entry?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}

/// Committed rows matching `filter`, in insertion order.
///
/// A filter on the primary key is a point lookup and a filter on an indexed
/// column scans that column's index. Anything else walks the insertion order.
fn select(
    rows: &impl ReadableTable<&'static str, &'static [u8]>,
    order: &impl ReadableTable<&'static [u8], &'static str>,
    columns: &impl ReadableTable<&'static [u8], &'static str>,
    schema: &TableSchema,
    filter: &Filter,
) -> StoreResult<Vec<(String, StoredRow)>> {
    let indexed = schema
        .indexed
        .iter()
        .find_map(|column| index_value(filter.value_of(column)).map(|value| (*column, value)));

    let keys = match (filter.value_of(schema.primary_key), indexed) {
        (Some(key), _) => vec![key_string(key)],
        (None, Some((column, value))) => {
            scan_prefix(columns, &make_prefix(&[schema.name, column, &value]))?
        }
        (None, None) => scan_prefix(order, &make_prefix(&[schema.name]))?,
    };

    let mut selected = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(stored) = get_row(rows, &key)? {
            if filter.matches(&stored.row) {
                selected.push((key, stored));
            }
        }
    }
    Ok(selected)
}

/// Fail when a unique column of `row` already belongs to another key.
fn check_unique_index(
    unique: &impl ReadableTable<&'static [u8], &'static str>,
    schema: &TableSchema,
    key: &str,
    row: &Row,
) -> StoreResult<()> {
    for column in schema.unique {
        let Some(value) = index_value(row.get(*column)) else {
            continue;
        };
        if let Some(owner) = unique.get(make_prefix(&[schema.name, column, &value]).as_slice())? {
            if owner.value() != key {
                return Err(StoreError::Constraint(ConstraintViolation::unique(
                    schema.name,
                    *column,
                )));
            }
        }
    }
    Ok(())
}

/// Committed rows matching `filter` plus the rows stored under `extra_keys`
/// (matching or not), in insertion order.
fn read_committed(
    db: &Database,
    schema: &TableSchema,
    filter: &Filter,
    extra_keys: &[String],
) -> StoreResult<Vec<(String, StoredRow)>> {
    let read_txn = db.begin_read()?;
    let rows = match read_txn.open_table(rows_table(schema)) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let order = read_txn.open_table(ROW_ORDER)?;
    let columns = read_txn.open_table(COLUMN_INDEX)?;

    let mut selected = select(&rows, &order, &columns, schema, filter)?;
    for key in extra_keys {
        if selected.iter().any(|(k, _)| k == key) {
            continue;
        }
        if let Some(stored) = get_row(&rows, key)? {
            selected.push((key.clone(), stored));
        }
    }
    selected.sort_by_key(|(_, stored)| stored.seq);
    Ok(selected)
}

async fn load_committed(
    db: Arc<Database>,
    schema: TableSchema,
    filter: Filter,
    extra_keys: Vec<String>,
) -> StoreResult<Vec<(String, StoredRow)>> {
    tokio::task::spawn_blocking(move || read_committed(&db, &schema, &filter, &extra_keys)).await?
}

/// Primary key and unique columns of a new row must be free in committed
/// state.
fn check_committed_conflicts(
    db: &Database,
    schema: &TableSchema,
    key: &str,
    row: &Row,
) -> StoreResult<()> {
    let read_txn = db.begin_read()?;
    let rows = match read_txn.open_table(rows_table(schema)) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if rows.get(key)?.is_some() {
        return Err(StoreError::Constraint(ConstraintViolation::unique(
            schema.name,
            schema.primary_key,
        )));
    }
    let unique = read_txn.open_table(UNIQUE_INDEX)?;
    check_unique_index(&unique, schema, key, row)
}

/// Merge `changes` into `row`. The primary key is immutable.
fn apply_changes(schema: &TableSchema, mut row: Row, changes: &Row) -> StoreResult<Row> {
    if let Some(new_key) = changes.get(schema.primary_key) {
        if row.get(schema.primary_key) != Some(new_key) {
            return Err(StoreError::InvalidRow {
                table: schema.name.to_string(),
                reason: format!("primary key `{}` cannot be updated", schema.primary_key),
            });
        }
    }
    row.extend(changes.clone());
    schema.check_not_null(&row)?;
    Ok(row)
}

/// Run `f` inside a redb write transaction, committing on success and
/// aborting on error.
fn in_write_txn<T>(
    db: &Database,
    f: impl FnOnce(&WriteTransaction) -> StoreResult<T>,
) -> StoreResult<T> {
    let write_txn = db.begin_write()?;
    match f(&write_txn) {
        Ok(value) => {
            write_txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            write_txn.abort()?;
            Err(e)
        }
    }
}

// =============================================================================
// Write Path
// =============================================================================

/// Row table and index tables of one schema, open in a write transaction.
struct WriteTables<'txn> {
    schema: TableSchema,
    rows: Table<'txn, &'static str, &'static [u8]>,
    order: Table<'txn, &'static [u8], &'static str>,
    columns: Table<'txn, &'static [u8], &'static str>,
    unique: Table<'txn, &'static [u8], &'static str>,
}

impl<'txn> WriteTables<'txn> {
    fn open(write_txn: &'txn WriteTransaction, schema: TableSchema) -> StoreResult<Self> {
        Ok(Self {
            rows: write_txn.open_table(rows_table(&schema))?,
            order: write_txn.open_table(ROW_ORDER)?,
            columns: write_txn.open_table(COLUMN_INDEX)?,
            unique: write_txn.open_table(UNIQUE_INDEX)?,
            schema,
        })
    }

    fn select(&self, filter: &Filter) -> StoreResult<Vec<(String, StoredRow)>> {
        select(&self.rows, &self.order, &self.columns, &self.schema, filter)
    }

    fn insert(&mut self, key: &str, row: Row, seq: u64) -> StoreResult<()> {
        let schema = self.schema;
        schema.check_not_null(&row)?;
        if self.rows.get(key)?.is_some() {
            return Err(StoreError::Constraint(ConstraintViolation::unique(
                schema.name,
                schema.primary_key,
            )));
        }
        check_unique_index(&self.unique, &schema, key, &row)?;

        self.order
            .insert(make_sequenced_key(&[schema.name], seq).as_slice(), key)?;
        for column in schema.indexed {
            if let Some(value) = index_value(row.get(*column)) {
                let index_key = make_sequenced_key(&[schema.name, column, &value], seq);
                self.columns.insert(index_key.as_slice(), key)?;
            }
        }
        for column in schema.unique {
            if let Some(value) = index_value(row.get(*column)) {
                let index_key = make_prefix(&[schema.name, column, &value]);
                self.unique.insert(index_key.as_slice(), key)?;
            }
        }

        let stored = StoredRow { seq, row };
        self.rows
            .insert(key, serde_json::to_vec(&stored)?.as_slice())?;
        Ok(())
    }

    /// Merge `changes` into the stored row and move its index entries.
    fn update(&mut self, key: &str, stored: StoredRow, changes: &Row) -> StoreResult<()> {
        let schema = self.schema;
        let updated = apply_changes(&schema, stored.row.clone(), changes)?;
        check_unique_index(&self.unique, &schema, key, &updated)?;

        for column in schema.indexed {
            let old = index_value(stored.row.get(*column));
            let new = index_value(updated.get(*column));
            if old == new {
                continue;
            }
            if let Some(value) = old {
                let index_key = make_sequenced_key(&[schema.name, column, &value], stored.seq);
                self.columns.remove(index_key.as_slice())?;
            }
            if let Some(value) = new {
                let index_key = make_sequenced_key(&[schema.name, column, &value], stored.seq);
                self.columns.insert(index_key.as_slice(), key)?;
            }
        }
        for column in schema.unique {
            let old = index_value(stored.row.get(*column));
            let new = index_value(updated.get(*column));
            if old == new {
                continue;
            }
            if let Some(value) = old {
                self.unique
                    .remove(make_prefix(&[schema.name, column, &value]).as_slice())?;
            }
            if let Some(value) = new {
                self.unique
                    .insert(make_prefix(&[schema.name, column, &value]).as_slice(), key)?;
            }
        }

        let stored = StoredRow {
            seq: stored.seq,
            row: updated,
        };
        self.rows
            .insert(key, serde_json::to_vec(&stored)?.as_slice())?;
        Ok(())
    }
}

// =============================================================================
// Staged Writes
// =============================================================================

struct StagedTable {
    schema: TableSchema,
    /// New rows, in statement order.
    inserts: Vec<(String, Row)>,
    /// Accumulated column changes for rows that were committed before this
    /// transaction started.
    updates: HashMap<String, Row>,
}

impl StagedTable {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            inserts: Vec::new(),
            updates: HashMap::new(),
        }
    }

    /// Committed rows overlaid with this transaction's writes.
    fn overlay(&self, committed: Vec<(String, StoredRow)>) -> Vec<(String, Row)> {
        let mut rows: Vec<(String, Row)> = committed
            .into_iter()
            .map(|(key, stored)| {
                let mut row = stored.row;
                if let Some(changes) = self.updates.get(&key) {
                    row.extend(changes.clone());
                }
                (key, row)
            })
            .collect();
        rows.extend(self.inserts.iter().cloned());
        rows
    }
}

#[derive(Default)]
struct Staged {
    tables: BTreeMap<&'static str, StagedTable>,
}

impl Staged {
    fn table_mut(&mut self, schema: &TableSchema) -> &mut StagedTable {
        self.tables
            .entry(schema.name)
            .or_insert_with(|| StagedTable::new(*schema))
    }

    fn is_empty(&self) -> bool {
        self.tables
            .values()
            .all(|t| t.inserts.is_empty() && t.updates.is_empty())
    }
}

fn write_staged(write_txn: &WriteTransaction, staged: Staged) -> StoreResult<()> {
    let mut sequences = write_txn.open_table(SEQUENCES)?;

    for (name, staged_table) in staged.tables {
        let mut tables = WriteTables::open(write_txn, staged_table.schema)?;

        for (key, changes) in staged_table.updates {
            let Some(stored) = get_row(&tables.rows, &key)? else {
                continue;
            };
            tables.update(&key, stored, &changes)?;
        }

        let mut seq = sequences.get(name)?.map(|v| v.value()).unwrap_or(0);
        for (key, row) in staged_table.inserts {
            seq += 1;
            tables.insert(&key, row, seq)?;
        }
        sequences.insert(name, seq)?;
    }

    Ok(())
}

fn write_update(
    write_txn: &WriteTransaction,
    schema: TableSchema,
    filter: &Filter,
    changes: &Row,
) -> StoreResult<u64> {
    let mut tables = WriteTables::open(write_txn, schema)?;
    let matching = tables.select(filter)?;

    let mut count = 0;
    for (key, stored) in matching {
        tables.update(&key, stored, changes)?;
        count += 1;
    }
    Ok(count)
}

// =============================================================================
// RedbTransaction
// =============================================================================

/// Transaction handle with staged writes. `None` once committed or rolled
/// back.
pub struct RedbTransaction {
    db: Arc<Database>,
    staged: Mutex<Option<Staged>>,
}

impl RedbTransaction {
    fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            staged: Mutex::new(Some(Staged::default())),
        }
    }

    fn with_staged<T>(&self, f: impl FnOnce(&mut Staged) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(staged) => f(staged),
            None => Err(StoreError::TransactionClosed),
        }
    }

    fn take_staged(&self) -> StoreResult<Staged> {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StoreError::TransactionClosed)
    }

    /// Keys of committed rows this transaction has pending changes for.
    fn staged_update_keys(&self, table: &TableSchema) -> StoreResult<Vec<String>> {
        self.with_staged(|staged| {
            Ok(staged
                .tables
                .get(table.name)
                .map(|t| t.updates.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    /// Committed rows a filtered statement has to look at: the filter's
    /// matches plus every row with a pending change.
    async fn candidates(
        &self,
        table: &TableSchema,
        filter: &Filter,
    ) -> StoreResult<Vec<(String, StoredRow)>> {
        let extra_keys = self.staged_update_keys(table)?;
        load_committed(self.db.clone(), *table, filter.clone(), extra_keys).await
    }
}

#[async_trait]
impl TransactionHandle for RedbTransaction {
    async fn insert(&self, table: &TableSchema, row: Row) -> StoreResult<()> {
        self.with_staged(|_| Ok(()))?;
        let key = table.primary_key_of(&row)?;
        table.check_not_null(&row)?;

        let db = self.db.clone();
        let (schema, check_key, check_row) = (*table, key.clone(), row.clone());
        tokio::task::spawn_blocking(move || {
            check_committed_conflicts(&db, &schema, &check_key, &check_row)
        })
        .await??;

        self.with_staged(|staged| {
            let staged_table = staged.table_mut(table);
            table.check_unique(
                &key,
                &row,
                staged_table.inserts.iter().map(|(k, r)| (k.as_str(), r)),
            )?;
            staged_table.inserts.push((key, row));
            Ok(())
        })
    }

    /// Unique columns touched by an update are only checked at commit.
    async fn update(
        &self,
        table: &TableSchema,
        filter: &Filter,
        changes: Row,
    ) -> StoreResult<u64> {
        let committed = self.candidates(table, filter).await?;

        self.with_staged(|staged| {
            let staged_table = staged.table_mut(table);
            let mut count = 0;

            for (key, stored) in committed {
                let mut row = stored.row;
                if let Some(pending) = staged_table.updates.get(&key) {
                    row.extend(pending.clone());
                }
                if !filter.matches(&row) {
                    continue;
                }
                apply_changes(table, row, &changes)?;
                staged_table
                    .updates
                    .entry(key)
                    .or_default()
                    .extend(changes.clone());
                count += 1;
            }

            for (_, row) in staged_table.inserts.iter_mut() {
                if filter.matches(row) {
                    *row = apply_changes(table, row.clone(), &changes)?;
                    count += 1;
                }
            }

            Ok(count)
        })
    }

    async fn find(&self, table: &TableSchema, filter: &Filter) -> StoreResult<Vec<Row>> {
        let committed = self.candidates(table, filter).await?;

        self.with_staged(|staged| {
            let rows = match staged.tables.get(table.name) {
                Some(staged_table) => staged_table.overlay(committed),
                None => committed
                    .into_iter()
                    .map(|(key, stored)| (key, stored.row))
                    .collect(),
            };
            Ok(rows
                .into_iter()
                .map(|(_, row)| row)
                .filter(|row| filter.matches(row))
                .collect())
        })
    }

    async fn commit(&self) -> StoreResult<()> {
        let staged = self.take_staged()?;
        if staged.is_empty() {
            return Ok(());
        }
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || in_write_txn(&db, |txn| write_staged(txn, staged)))
            .await?
    }

    async fn rollback(&self) -> StoreResult<()> {
        drop(self.take_staged()?);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

// =============================================================================
// RedbBackend
// =============================================================================

/// Embedded ACID storage.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) the database at the given path and pre-create the
    /// tables for `schemas`.
    pub fn open(path: &Path, schemas: &[TableSchema]) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SEQUENCES)?;
            let _ = write_txn.open_table(ROW_ORDER)?;
            let _ = write_txn.open_table(COLUMN_INDEX)?;
            let _ = write_txn.open_table(UNIQUE_INDEX)?;
            for schema in schemas {
                let _ = write_txn.open_table(rows_table(schema))?;
            }
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), tables = schemas.len(), "Opened redb storage");
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn begin(&self) -> StoreResult<Arc<dyn TransactionHandle>> {
        Ok(Arc::new(RedbTransaction::new(self.db.clone())))
    }

    async fn find(&self, table: &TableSchema, filter: &Filter) -> StoreResult<Vec<Row>> {
        let committed = load_committed(self.db.clone(), *table, filter.clone(), Vec::new()).await?;
        Ok(committed.into_iter().map(|(_, stored)| stored.row).collect())
    }

    async fn update(
        &self,
        table: &TableSchema,
        filter: &Filter,
        changes: Row,
    ) -> StoreResult<u64> {
        let db = self.db.clone();
        let schema = *table;
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || {
            in_write_txn(&db, |txn| write_update(txn, schema, &filter, &changes))
        })
        .await?
    }

    async fn ping(&self) -> StoreResult<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let read_txn = db.begin_read()?;
            let _ = read_txn.open_table(SEQUENCES)?;
            Ok(())
        })
        .await?
    }
}
