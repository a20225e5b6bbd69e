//! The lazily-connecting connection manager.
//!
//! A [`Connection`] is created from [`ConnectionParams`] and a [`Connector`]
//! at configuration time and only opens its native handle on first use. Every
//! statement that goes through it is timed and appended to an in-memory
//! statement log, and driver errors come back annotated with the SQL that
//! caused them.

use crate::dialect::Dialect;
use crate::driver::{Connector, Driver, standard_quote};
use crate::dsn::ConnectionParams;
use crate::error::{Error, Result};
use crate::params::Params;
use crate::row::Row;
use crate::value::{Value, integer_roundtrip};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementLog {
    pub sql: String,
    pub elapsed: Duration,
    pub failed: bool,
}

/// A database connection that opens its native handle on first use.
///
/// The handle sits behind a mutex, so a `Connection` can be shared through an
/// `Arc`, but statements on one connection are serialized. Use one
/// connection per worker for concurrent access.
pub struct Connection {
    params: ConnectionParams,
    connector: Arc<dyn Connector>,
    handle: Mutex<Option<Box<dyn Driver>>>,
    log: Mutex<Vec<StatementLog>>,
    in_transaction: AtomicBool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("dsn", &self.params.to_dsn())
            .field("connected", &self.is_connected())
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection. No native handle is opened yet.
    pub fn new(params: ConnectionParams, connector: Arc<dyn Connector>) -> Self {
        Self {
            params,
            connector,
            handle: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Parse `dsn` and create a connection.
    pub fn from_dsn(dsn: &str, connector: Arc<dyn Connector>) -> Result<Self> {
        Ok(Self::new(ConnectionParams::parse(dsn)?, connector))
    }

    /// Wrap an already open driver.
    pub fn with_driver(params: ConnectionParams, driver: Box<dyn Driver>) -> Self {
        let conn = Self::new(params, Arc::new(crate::driver::NoConnector));
        *conn.lock_handle() = Some(driver);
        conn
    }

    pub fn dialect(&self) -> Dialect {
        self.params.dialect
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Whether the native handle has been opened.
    pub fn is_connected(&self) -> bool {
        self.lock_handle().is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    /// Open the native handle now instead of on first statement.
    pub fn connect(&self) -> Result<()> {
        self.with_driver_mut(|_| Ok(()))
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<Box<dyn Driver>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_log(&self) -> MutexGuard<'_, Vec<StatementLog>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_driver_mut<T>(&self, f: impl FnOnce(&mut dyn Driver) -> Result<T>) -> Result<T> {
        let mut guard = self.lock_handle();
        let driver = match guard.take() {
            Some(driver) => guard.insert(driver),
            None => {
                tracing::debug!(
                    dialect = %self.params.dialect,
                    dsn = %self.params.to_dsn(),
                    "Opening database connection"
                );
                guard.insert(self.connector.connect(&self.params)?)
            }
        };
        f(driver.as_mut())
    }

    /// Run `op` with timing, logging and error annotation.
    ///
    /// `logged_sql` is what goes into the log and error messages; for prepared
    /// statements it is the rendered diagnostic form.
    fn run<T>(
        &self,
        logged_sql: &str,
        op: impl FnOnce(&mut dyn Driver) -> Result<T>,
        count: impl Fn(&T) -> usize,
    ) -> Result<T> {
        let start = Instant::now();
        let result = self.with_driver_mut(op);
        let elapsed = start.elapsed();
        self.lock_log().push(StatementLog {
            sql: logged_sql.to_string(),
            elapsed,
            failed: result.is_err(),
        });
        match result {
            Ok(value) => {
                tracing::debug!(
                    sql = %logged_sql,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    rows = count(&value),
                    "Statement executed"
                );
                Ok(value)
            }
            Err(e) => {
                let e = e.with_sql(logged_sql);
                tracing::warn!(sql = %logged_sql, error = %e, "Statement failed");
                Err(e)
            }
        }
    }

    /// Execute a statement without parameters.
    pub fn execute(&self, sql: &str) -> Result<u64> {
        self.execute_with(sql, &Params::new())
    }

    /// Execute a statement with named parameters and return affected rows.
    #[tracing::instrument(level = "debug", skip(self, params))]
    pub fn execute_with(&self, sql: &str, params: &Params) -> Result<u64> {
        tracing::trace!(params = ?params, "Binding parameters");
        self.run(sql, |d| d.execute(sql, params), |n| usize::try_from(*n).unwrap_or(usize::MAX))
    }

    /// Run a query without parameters.
    pub fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.query_with(sql, &Params::new())
    }

    /// Run a query with named parameters.
    #[tracing::instrument(level = "debug", skip(self, params))]
    pub fn query_with(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        tracing::trace!(params = ?params, "Binding parameters");
        self.run(sql, |d| d.query(sql, params), Vec::len)
    }

    /// Identity generated by the most recent insert on this connection.
    pub fn last_insert_id(&self) -> Result<Option<i64>> {
        self.with_driver_mut(|d| d.last_insert_id())
    }

    /// Prepare a statement for repeated execution.
    pub fn prepare<'a>(&'a self, sql: &str) -> PreparedStatement<'a> {
        PreparedStatement {
            conn: self,
            sql: sql.to_string(),
        }
    }

    /// Quote a value as a SQL literal.
    ///
    /// Sequences are quoted element-wise and joined with commas for use inside
    /// `IN (...)`. Text that survives an integer round trip unchanged is
    /// emitted as a bare integer.
    pub fn quote(&self, value: &Value) -> String {
        let guard = self.lock_handle();
        let driver = guard.as_deref();
        quote_value(self.dialect(), value, &|s: &str| {
            driver.map_or_else(|| standard_quote(s), |d| d.quote_str(s))
        })
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.execute(self.dialect().begin_statement())?;
        self.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.execute("COMMIT")?;
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        let result = self.execute("ROLLBACK");
        self.in_transaction.store(false, Ordering::Release);
        result.map(|_| ())
    }

    /// Snapshot of the statement log.
    pub fn log(&self) -> Vec<StatementLog> {
        self.lock_log().clone()
    }

    pub fn log_len(&self) -> usize {
        self.lock_log().len()
    }

    pub fn clear_log(&self) {
        self.lock_log().clear();
    }
}

fn quote_value(dialect: Dialect, value: &Value, quote_str: &dyn Fn(&str) -> String) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(s) => match integer_roundtrip(s) {
            Some(i) => i.to_string(),
            None => quote_str(s),
        },
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            match dialect {
                Dialect::Mssql => format!("0x{}", hex),
                Dialect::Postgres => format!("'\\x{}'", hex),
                Dialect::Mysql | Dialect::Sqlite => format!("X'{}'", hex),
            }
        }
        Value::Json(j) => quote_str(&j.to_string()),
        Value::Array(items) => items
            .iter()
            .map(|item| quote_value(dialect, item, quote_str))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// A statement bound to a connection, executed with different parameters.
#[derive(Debug)]
pub struct PreparedStatement<'a> {
    conn: &'a Connection,
    sql: String,
}

impl PreparedStatement<'_> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn execute(&self, params: &Params) -> Result<u64> {
        let rendered = self.render(params);
        self.conn.run(
            &rendered,
            |d| d.execute(&self.sql, params),
            |n| usize::try_from(*n).unwrap_or(usize::MAX),
        )
    }

    pub fn query(&self, params: &Params) -> Result<Vec<Row>> {
        let rendered = self.render(params);
        self.conn
            .run(&rendered, |d| d.query(&self.sql, params), Vec::len)
    }

    /// Human-readable SQL with placeholders replaced by quoted values.
    ///
    /// For diagnostics only; execution always binds parameters.
    pub fn render(&self, params: &Params) -> String {
        render_sql(self.conn, &self.sql, params)
    }
}

/// Substitute quoted parameter values into `sql`.
///
/// Longer names are substituted first so `:p1` never clobbers `:p10`.
pub fn render_sql(conn: &Connection, sql: &str, params: &Params) -> String {
    let mut named: Vec<(&str, &Value)> = params.iter().collect();
    named.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    let mut out = sql.to_string();
    for (name, value) in named {
        out = out.replace(&format!(":{}", name), &conn.quote(value));
    }
    out
}
