//! SQLite native handle.
//!
//! [`SqliteDriver`] wraps one `sqlite3*` and implements the core
//! [`Driver`] trait. Parameters are bound by name: every `:name` in the
//! statement is looked up in the [`Params`] map, anonymous `?` parameters
//! take map entries in order.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use sqlrecord_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use sqlrecord_core::row::ColumnInfo;
use sqlrecord_core::{
    ConnectionParams, Connector, Dialect, Driver, Error, Params, Result, Row, Value,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::Arc;

/// Default busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

/// Configuration for opening SQLite databases.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    pub read_only: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            uri: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Derive a config from connection parameters.
    ///
    /// Recognized extra keys: `busy_timeout` (ms), `mode=ro`.
    pub fn from_params(params: &ConnectionParams) -> Result<Self> {
        if params.dialect != Dialect::Sqlite {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::NoDriver,
                message: format!("SQLite driver cannot open a {} connection", params.dialect),
                source: None,
            }));
        }
        let mut config = Self::file(
            params
                .path
                .clone()
                .unwrap_or_else(|| ":memory:".to_string()),
        );
        if let Some(timeout) = params.extra.get("busy_timeout") {
            config.busy_timeout_ms = timeout
                .parse()
                .map_err(|_| Error::config(format!("invalid busy_timeout '{}'", timeout)))?;
        }
        config.read_only = params.extra.get("mode").is_some_and(|m| m == "ro");
        config.uri = config.path.starts_with("file:");
        Ok(config)
    }

    #[must_use]
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    fn open_flags(&self) -> c_int {
        let mut flags = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        };
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        flags
    }
}

/// An open SQLite database handle.
pub struct SqliteDriver {
    db: *mut ffi::sqlite3,
    path: String,
}

// SAFETY: the handle is only ever used through `&mut self`, and the core
// `Connection` keeps drivers behind a mutex, so it is never used from two
// threads at once.
unsafe impl Send for SqliteDriver {}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteDriver {
    /// Open a database with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe {
            ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.open_flags(), ptr::null())
        };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database '{}': {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(
                    db,
                    c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX),
                );
            }
        }

        tracing::debug!(path = %config.path, version = ffi::version(), "Opened SQLite database");

        Ok(Self {
            db,
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of rows changed by the last statement.
    pub fn changes(&self) -> u64 {
        // SAFETY: db is valid
        let n = unsafe { ffi::sqlite3_changes(self.db) };
        u64::try_from(n).unwrap_or(0)
    }

    fn prepare(&self, sql: &str, params: &Params) -> Result<Statement> {
        let stmt = Statement(prepare_stmt(self.db, sql)?);
        self.bind_all(&stmt, sql, params)?;
        Ok(stmt)
    }

    fn bind_all(&self, stmt: &Statement, sql: &str, params: &Params) -> Result<()> {
        // SAFETY: stmt is valid
        let count = unsafe { ffi::sqlite3_bind_parameter_count(stmt.0) };
        let mut positional = params.iter().map(|(_, v)| v);
        for index in 1..=count {
            // SAFETY: stmt is valid, index is in 1..=count
            let name = unsafe { types::parameter_name(stmt.0, index) };
            let value = match &name {
                Some(name) => params.get(name),
                None => positional.next(),
            };
            let Some(value) = value else {
                return Err(missing_param_error(sql, name.as_deref(), index));
            };
            // SAFETY: stmt is valid, index is in 1..=count
            let rc = unsafe { types::bind_value(stmt.0, index, value) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(self.db, sql, index));
            }
        }
        Ok(())
    }
}

impl Drop for SqliteDriver {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and closed exactly once
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
            self.db = ptr::null_mut();
        }
    }
}

/// Finalizes the statement when dropped, on every exit path.
struct Statement(*mut ffi::sqlite3_stmt);

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: the statement came from a successful prepare
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let stmt = self.prepare(sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.0) };
        let mut col_names = Vec::with_capacity(usize::try_from(col_count).unwrap_or(0));
        for i in 0..col_count {
            // SAFETY: stmt is valid, i < col_count
            let name =
                unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{}", i));
            col_names.push(name);
        }
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            let rc = unsafe { ffi::sqlite3_step(stmt.0) };
            match rc {
                ffi::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.0, i) })
                        .collect::<Vec<Value>>();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(step_error(self.db, sql)),
            }
        }
        Ok(rows)
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<u64> {
        let stmt = self.prepare(sql, params)?;
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt.0) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => Ok(self.changes()),
            _ => Err(step_error(self.db, sql)),
        }
    }

    fn last_insert_id(&mut self) -> Result<Option<i64>> {
        // SAFETY: db is valid
        let id = unsafe { ffi::sqlite3_last_insert_rowid(self.db) };
        Ok((id != 0).then_some(id))
    }
}

/// Opens [`SqliteDriver`]s for `sqlite:` connection parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Driver>> {
        let config = SqliteConfig::from_params(params)?;
        Ok(Box::new(SqliteDriver::open(&config)?))
    }
}

// Helper functions

/// # Safety
/// `db` must be a valid handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is valid, errmsg returns a valid C string
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| {
        let mut err = QueryError::from_message("SQL contains null byte", Some(sql));
        err.kind = QueryErrorKind::Syntax;
        Error::Query(err)
    })?;
    let len = c_int::try_from(c_sql.as_bytes().len()).map_err(|_| {
        let mut err = QueryError::from_message("SQL text too long", Some(sql));
        err.kind = QueryErrorKind::DataTruncation;
        Error::Query(err)
    })?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut()) };

    if rc != ffi::SQLITE_OK {
        return Err(step_error(db, sql));
    }
    if stmt.is_null() {
        let mut err = QueryError::from_message("empty statement", Some(sql));
        err.kind = QueryErrorKind::Syntax;
        return Err(Error::Query(err));
    }

    Ok(stmt)
}

fn missing_param_error(sql: &str, name: Option<&str>, index: c_int) -> Error {
    let message = match name {
        Some(name) => format!("no value bound for parameter :{}", name),
        None => format!("no value bound for parameter {}", index),
    };
    let mut err = QueryError::from_message(message, Some(sql));
    err.kind = QueryErrorKind::Bind;
    err.sqlstate = Some("HY093".to_string());
    Error::Query(err)
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, index: c_int) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { errmsg(db) };
    let mut err = QueryError::from_message(
        format!("Failed to bind parameter {}: {}", index, msg),
        Some(sql),
    );
    err.kind = QueryErrorKind::Bind;
    Error::Query(err)
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let msg = unsafe { errmsg(db) };
    // SAFETY: db is valid
    let code = unsafe { ffi::sqlite3_errcode(db) };

    let mut err = QueryError::from_message(msg, Some(sql));
    let kind = error_code_to_kind(code);
    if kind != QueryErrorKind::Database {
        err.kind = kind;
    }
    err.sqlstate = Some(sqlstate_for(code).to_string());
    Error::Query(err)
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_RANGE => QueryErrorKind::Bind,
        _ => QueryErrorKind::Database,
    }
}

fn sqlstate_for(code: c_int) -> &'static str {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => "23000",
        _ => "HY000",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SqliteDriver {
        let mut db = SqliteDriver::open_memory().unwrap();
        db.execute(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
            &Params::new(),
        )
        .unwrap();
        db
    }

    #[test]
    fn test_open_memory() {
        let db = SqliteDriver::open_memory().unwrap();
        assert_eq!(db.path(), ":memory:");
    }

    #[test]
    fn test_named_parameters() {
        let mut db = memory();
        let params = Params::new().with("name", "Alice").with("age", 30);
        let changed = db
            .execute("INSERT INTO test (name, age) VALUES (:name, :age)", &params)
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(db.last_insert_id().unwrap(), Some(1));

        let rows = db
            .query(
                "SELECT * FROM test WHERE name = :p0",
                &Params::new().with("p0", "Alice"),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_named::<i64>("age").unwrap(), 30);
    }

    #[test]
    fn test_positional_parameters() {
        let mut db = memory();
        let mut params = Params::new();
        params.bind("Bob");
        db.execute("INSERT INTO test (name) VALUES (?)", &params)
            .unwrap();
        let rows = db.query("SELECT name FROM test", &Params::new()).unwrap();
        assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Bob");
    }

    #[test]
    fn test_null_and_bool_values() {
        let mut db = memory();
        db.execute(
            "INSERT INTO test (name, age) VALUES (:n, :a)",
            &Params::new().with("n", Value::Null).with("a", true),
        )
        .unwrap();
        let rows = db.query("SELECT * FROM test", &Params::new()).unwrap();
        assert_eq!(rows[0].get_named::<Option<String>>("name").unwrap(), None);
        assert_eq!(rows[0].get_named::<i64>("age").unwrap(), 1);
    }

    #[test]
    fn test_missing_parameter() {
        let mut db = memory();
        let err = db
            .query("SELECT * FROM test WHERE id = :id", &Params::new())
            .unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Bind);
                assert_eq!(q.sql.as_deref(), Some("SELECT * FROM test WHERE id = :id"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_syntax_error_extracts_near() {
        let mut db = memory();
        let err = db.query("SELEC * FROM test", &Params::new()).unwrap_err();
        assert_eq!(err.near(), Some("SELEC"));
        assert_eq!(err.sqlstate(), Some("HY000"));
    }

    #[test]
    fn test_constraint_violation() {
        let mut db = memory();
        db.execute("INSERT INTO test (id, name) VALUES (1, 'a')", &Params::new())
            .unwrap();
        let err = db
            .execute("INSERT INTO test (id, name) VALUES (1, 'b')", &Params::new())
            .unwrap_err();
        match err {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Constraint);
                assert_eq!(q.sqlstate.as_deref(), Some("23000"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_connector_rejects_other_dialects() {
        let params = ConnectionParams::parse("mysql:dbname=app").unwrap();
        assert!(SqliteConnector.connect(&params).is_err());
        let params = ConnectionParams::parse("sqlite::memory:").unwrap();
        assert!(SqliteConnector.connect(&params).is_ok());
    }
}
