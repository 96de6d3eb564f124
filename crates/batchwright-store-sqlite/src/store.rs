// crates/batchwright-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Transactional Handle
// Description: TransactionalHandle implementation over a single SQLite connection.
// Purpose: Apply commit windows durably with savepoint-isolated mutations.
// Dependencies: batchwright-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteHandle`] owns one `SQLite` connection. Records live in a `records`
//! table with JSON-encoded properties; unique property constraints are
//! declared in `unique_constraints` and enforced through `unique_values`.
//! Busy and locked database errors surface as fatal
//! [`StoreError::Conflict`], constraint violations as non-fatal
//! [`StoreError::Constraint`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use batchwright_core::EdgeEndpoints;
use batchwright_core::NewRecord;
use batchwright_core::Properties;
use batchwright_core::RecordId;
use batchwright_core::RecordKind;
use batchwright_core::StoreError;
use batchwright_core::StoredRecord;
use batchwright_core::TransactionRef;
use batchwright_core::TransactionalHandle;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum busy timeout (ms).
pub const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Savepoint wrapping each mutation.
const MUTATION_SAVEPOINT: &str = "batchwright_mutation";
/// Column list used by record reads.
const RECORD_COLUMNS: &str = "id, kind, record_type, properties_json, edge_from, edge_to";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` handle.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates path and timeout limits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is violated.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(SqliteStoreError::Invalid(format!(
                "busy_timeout_ms out of range: {} (max {MAX_BUSY_TIMEOUT_MS})",
                self.busy_timeout_ms
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding record payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::VersionMismatch(message) => {
                Self::Io(format!("schema version mismatch: {message}"))
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error raised inside a transaction to a [`StoreError`].
fn classify_db_error(error: &rusqlite::Error) -> StoreError {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => StoreError::Constraint(error.to_string()),
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                StoreError::Conflict(error.to_string())
            }
            _ => StoreError::Io(error.to_string()),
        },
        _ => StoreError::Io(error.to_string()),
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Transaction counters for a [`SqliteHandle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SqliteHandleStats {
    /// Transactions begun.
    pub begins: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back, including failed commits.
    pub rollbacks: u64,
    /// Busy or locked errors observed.
    pub busy_errors: u64,
}

/// `SQLite`-backed transactional handle.
///
/// # Invariants
/// - At most one transaction is open on the connection.
/// - Every mutation runs inside its own savepoint.
pub struct SqliteHandle {
    /// Handle configuration.
    config: SqliteStoreConfig,
    /// Owned connection.
    connection: Connection,
    /// Token of the open transaction.
    open: Option<u64>,
    /// Last issued transaction token.
    last_tx: u64,
    /// Transaction counters.
    stats: SqliteHandleStats,
}

impl SqliteHandle {
    /// Opens or creates the database at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection,
            open: None,
            last_tx: 0,
            stats: SqliteHandleStats::default(),
        })
    }

    /// Returns the handle configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Returns the transaction counters.
    #[must_use]
    pub const fn stats(&self) -> SqliteHandleStats {
        self.stats
    }

    /// Declares `property` unique among records of `record_type`.
    ///
    /// Existing records are indexed immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a transaction is open or
    /// existing records already violate the constraint.
    pub fn declare_unique(
        &mut self,
        record_type: &str,
        property: &str,
    ) -> Result<(), SqliteStoreError> {
        if self.open.is_some() {
            return Err(SqliteStoreError::Invalid(
                "cannot declare constraints while a transaction is open".to_string(),
            ));
        }
        let tx =
            self.connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "INSERT OR IGNORE INTO unique_constraints (record_type, property) VALUES (?1, ?2)",
            params![record_type, property],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let existing = {
            let mut stmt = tx
                .prepare(&format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_type = ?1"))
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![record_type], read_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let mut records = Vec::new();
            for row in rows {
                let row = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
                records.push(row.into_record().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?);
            }
            records
        };
        for record in existing {
            let Some(value) = record.properties.get(property) else {
                continue;
            };
            let value_json = encode_value(value)?;
            let key = record_key(record.id).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT OR IGNORE INTO unique_values (record_type, property, value_json, record_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record_type, property, value_json, key],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let owner: i64 = tx
                .query_row(
                    "SELECT record_id FROM unique_values
                     WHERE record_type = ?1 AND property = ?2 AND value_json = ?3",
                    params![record_type, property, value_json],
                    |row| row.get(0),
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if owner != key {
                return Err(SqliteStoreError::Invalid(format!(
                    "existing {record_type} records share a value for {property}"
                )));
            }
        }
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
    }

    /// Returns a committed record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, SqliteStoreError> {
        let Ok(key) = record_key(id) else {
            return Ok(None);
        };
        let row = self
            .connection
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                params![key],
                read_row,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        row.map(RecordRow::into_record)
            .transpose()
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))
    }

    /// Counts records of `record_type`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn count_type(&self, record_type: &str) -> Result<u64, SqliteStoreError> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(1) FROM records WHERE record_type = ?1",
                params![record_type],
                |row| row.get(0),
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        u64::try_from(count).map_err(|_| SqliteStoreError::Invalid("negative count".to_string()))
    }

    /// Lists records of `record_type` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a row is malformed.
    pub fn list_type(&self, record_type: &str) -> Result<Vec<StoredRecord>, SqliteStoreError> {
        let mut stmt = self
            .connection
            .prepare_cached(&format!(
                "SELECT {RECORD_COLUMNS} FROM records WHERE record_type = ?1 ORDER BY id"
            ))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![record_type], read_row)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            records.push(row.into_record().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?);
        }
        Ok(records)
    }

    /// Rejects tokens that do not match the open transaction.
    fn ensure_open(&self, tx: &TransactionRef) -> Result<(), StoreError> {
        if self.open == Some(tx.get()) {
            Ok(())
        } else {
            Err(StoreError::Invalid(format!("transaction {} is not open", tx.get())))
        }
    }

    /// Runs `body` inside a savepoint, rolling back to it on error.
    fn in_savepoint<T>(
        &mut self,
        body: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.execute_control(&format!("SAVEPOINT {MUTATION_SAVEPOINT}"))?;
        match body(&self.connection) {
            Ok(value) => {
                self.execute_control(&format!("RELEASE {MUTATION_SAVEPOINT}"))?;
                Ok(value)
            }
            Err(error) => {
                if matches!(error, StoreError::Conflict(_)) {
                    self.stats.busy_errors = self.stats.busy_errors.saturating_add(1);
                }
                self.execute_control(&format!(
                    "ROLLBACK TO {MUTATION_SAVEPOINT}; RELEASE {MUTATION_SAVEPOINT}"
                ))?;
                Err(error)
            }
        }
    }

    /// Executes a transaction-control statement.
    fn execute_control(&mut self, sql: &str) -> Result<(), StoreError> {
        self.connection.execute_batch(sql).map_err(|err| {
            let error = classify_db_error(&err);
            if matches!(error, StoreError::Conflict(_)) {
                self.stats.busy_errors = self.stats.busy_errors.saturating_add(1);
            }
            error
        })
    }
}

impl TransactionalHandle for SqliteHandle {
    fn begin(&mut self) -> Result<TransactionRef, StoreError> {
        if self.open.is_some() {
            return Err(StoreError::Conflict("a transaction is already open".to_string()));
        }
        self.execute_control("BEGIN IMMEDIATE")?;
        self.last_tx = self.last_tx.saturating_add(1);
        self.open = Some(self.last_tx);
        self.stats.begins = self.stats.begins.saturating_add(1);
        Ok(TransactionRef::new(self.last_tx))
    }

    fn commit(&mut self, tx: TransactionRef) -> Result<(), StoreError> {
        self.ensure_open(&tx)?;
        self.open = None;
        match self.execute_control("COMMIT") {
            Ok(()) => {
                self.stats.commits = self.stats.commits.saturating_add(1);
                Ok(())
            }
            Err(error) => {
                if !self.connection.is_autocommit() {
                    let _ = self.connection.execute_batch("ROLLBACK");
                }
                self.stats.rollbacks = self.stats.rollbacks.saturating_add(1);
                Err(error)
            }
        }
    }

    fn rollback(&mut self, tx: TransactionRef) {
        if self.ensure_open(&tx).is_err() {
            return;
        }
        self.open = None;
        if !self.connection.is_autocommit() {
            let _ = self.connection.execute_batch("ROLLBACK");
        }
        self.stats.rollbacks = self.stats.rollbacks.saturating_add(1);
    }

    fn create(
        &mut self,
        tx: &TransactionRef,
        record: &NewRecord,
    ) -> Result<StoredRecord, StoreError> {
        self.ensure_open(tx)?;
        if let Some(message) = record.shape_error() {
            return Err(StoreError::Invalid(message));
        }
        let properties_json = serde_json::to_string(&record.properties)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        self.in_savepoint(|connection| {
            if let Some(endpoints) = record.endpoints {
                check_endpoint(connection, endpoints.from)?;
                check_endpoint(connection, endpoints.to)?;
            }
            let (edge_from, edge_to) = match record.endpoints {
                Some(endpoints) => {
                    (Some(record_key(endpoints.from)?), Some(record_key(endpoints.to)?))
                }
                None => (None, None),
            };
            connection
                .execute(
                    "INSERT INTO records (kind, record_type, properties_json, edge_from, edge_to)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.kind.as_str(),
                        record.record_type,
                        properties_json,
                        edge_from,
                        edge_to
                    ],
                )
                .map_err(|err| classify_db_error(&err))?;
            let id = record_id_from_key(connection.last_insert_rowid())?;
            index_unique_values(connection, &record.record_type, id, &record.properties)?;
            Ok(StoredRecord {
                id,
                kind: record.kind,
                record_type: record.record_type.clone(),
                properties: record.properties.clone(),
                endpoints: record.endpoints,
            })
        })
    }

    fn update(
        &mut self,
        tx: &TransactionRef,
        id: RecordId,
        changes: &Properties,
    ) -> Result<StoredRecord, StoreError> {
        self.ensure_open(tx)?;
        self.in_savepoint(|connection| {
            let key = record_key(id)?;
            let mut record = connection
                .query_row(
                    &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                    params![key],
                    read_row,
                )
                .optional()
                .map_err(|err| classify_db_error(&err))?
                .ok_or(StoreError::NotFound(id))?
                .into_record()?;
            record
                .properties
                .extend(changes.iter().map(|(name, value)| (name.clone(), value.clone())));
            let properties_json = serde_json::to_string(&record.properties)
                .map_err(|err| StoreError::Invalid(err.to_string()))?;
            connection
                .execute(
                    "UPDATE records SET properties_json = ?1 WHERE id = ?2",
                    params![properties_json, key],
                )
                .map_err(|err| classify_db_error(&err))?;
            connection
                .execute("DELETE FROM unique_values WHERE record_id = ?1", params![key])
                .map_err(|err| classify_db_error(&err))?;
            index_unique_values(connection, &record.record_type, id, &record.properties)?;
            Ok(record)
        })
    }

    fn delete(&mut self, tx: &TransactionRef, id: RecordId) -> Result<(), StoreError> {
        self.ensure_open(tx)?;
        self.in_savepoint(|connection| {
            let key = record_key(id)?;
            let deleted = connection
                .execute("DELETE FROM records WHERE id = ?1", params![key])
                .map_err(|err| classify_db_error(&err))?;
            if deleted == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw column values of a `records` row.
struct RecordRow {
    /// Row identity.
    id: i64,
    /// Kind label.
    kind: String,
    /// Record type.
    record_type: String,
    /// JSON-encoded properties.
    properties_json: String,
    /// Edge source.
    edge_from: Option<i64>,
    /// Edge target.
    edge_to: Option<i64>,
}

/// Reads a `records` row selected with [`RECORD_COLUMNS`].
fn read_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        record_type: row.get(2)?,
        properties_json: row.get(3)?,
        edge_from: row.get(4)?,
        edge_to: row.get(5)?,
    })
}

impl RecordRow {
    /// Decodes the row into a stored record.
    fn into_record(self) -> Result<StoredRecord, StoreError> {
        let kind = RecordKind::from_label(&self.kind)
            .ok_or_else(|| StoreError::Invalid(format!("unknown record kind: {}", self.kind)))?;
        let properties: Properties = serde_json::from_str(&self.properties_json)
            .map_err(|err| StoreError::Invalid(format!("corrupt properties: {err}")))?;
        let endpoints = match (self.edge_from, self.edge_to) {
            (Some(from), Some(to)) => Some(EdgeEndpoints {
                from: record_id_from_key(from)?,
                to: record_id_from_key(to)?,
            }),
            _ => None,
        };
        Ok(StoredRecord {
            id: record_id_from_key(self.id)?,
            kind,
            record_type: self.record_type,
            properties,
            endpoints,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a record identity to its row key.
fn record_key(id: RecordId) -> Result<i64, StoreError> {
    i64::try_from(id.get()).map_err(|_| StoreError::NotFound(id))
}

/// Converts a row key to a record identity.
fn record_id_from_key(key: i64) -> Result<RecordId, StoreError> {
    u64::try_from(key)
        .map(RecordId::from_raw)
        .map_err(|_| StoreError::Invalid(format!("negative record id: {key}")))
}

/// Encodes a property value for unique indexing.
fn encode_value(value: &serde_json::Value) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Verifies that an edge endpoint exists and is a vertex.
fn check_endpoint(connection: &Connection, id: RecordId) -> Result<(), StoreError> {
    let kind: Option<String> = connection
        .query_row("SELECT kind FROM records WHERE id = ?1", params![record_key(id)?], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| classify_db_error(&err))?;
    match kind.as_deref() {
        Some(label) if label == RecordKind::Vertex.as_str() => Ok(()),
        Some(_) => Err(StoreError::Invalid(format!("edge endpoint {id} is not a vertex"))),
        None => Err(StoreError::NotFound(id)),
    }
}

/// Inserts unique index entries for every constrained property of a record.
fn index_unique_values(
    connection: &Connection,
    record_type: &str,
    id: RecordId,
    properties: &Properties,
) -> Result<(), StoreError> {
    let mut stmt = connection
        .prepare_cached("SELECT property FROM unique_constraints WHERE record_type = ?1")
        .map_err(|err| classify_db_error(&err))?;
    let constrained = stmt
        .query_map(params![record_type], |row| row.get::<_, String>(0))
        .map_err(|err| classify_db_error(&err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| classify_db_error(&err))?;
    let key = record_key(id)?;
    for property in constrained {
        let Some(value) = properties.get(&property) else {
            continue;
        };
        let value_json = encode_value(value)?;
        connection
            .execute(
                "INSERT INTO unique_values (record_type, property, value_json, record_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record_type, property, value_json, key],
            )
            .map_err(|err| match classify_db_error(&err) {
                StoreError::Constraint(_) => StoreError::Constraint(format!(
                    "duplicate value {value_json} for unique property {record_type}.{property}"
                )),
                other => other,
            })?;
    }
    Ok(())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL,
                    record_type TEXT NOT NULL,
                    properties_json TEXT NOT NULL,
                    edge_from INTEGER REFERENCES records(id),
                    edge_to INTEGER REFERENCES records(id)
                );
                CREATE INDEX IF NOT EXISTS idx_records_type ON records (record_type, id);
                CREATE INDEX IF NOT EXISTS idx_records_edge_from ON records (edge_from);
                CREATE INDEX IF NOT EXISTS idx_records_edge_to ON records (edge_to);
                CREATE TABLE IF NOT EXISTS unique_constraints (
                    record_type TEXT NOT NULL,
                    property TEXT NOT NULL,
                    PRIMARY KEY (record_type, property)
                );
                CREATE TABLE IF NOT EXISTS unique_values (
                    record_type TEXT NOT NULL,
                    property TEXT NOT NULL,
                    value_json TEXT NOT NULL,
                    record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
                    PRIMARY KEY (record_type, property, value_json)
                );
                CREATE INDEX IF NOT EXISTS idx_unique_values_record
                    ON unique_values (record_id);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
