//! Error types for SQLRecord operations.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// The primary error type for all SQLRecord operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, missing driver)
    Connection(ConnectionError),
    /// Query execution errors, normalized from the native driver
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Schema reflection and DDL errors
    Schema(SchemaError),
    /// Programmer errors in builder or mapper usage
    Usage(UsageError),
    /// Active-record errors (identity, single-row fetch)
    Record(RecordError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the native handle
    Connect,
    /// No connector can serve the requested dialect
    NoDriver,
    /// The native handle was used after it was closed
    Disconnected,
}

/// A driver error normalized into a common shape.
#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    /// The offending SQL text
    pub sql: Option<String>,
    /// ISO state code, e.g. `42S02`
    pub sqlstate: Option<String>,
    pub message: String,
    /// Fragment quoted after `near` in syntax errors
    pub near: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database locked or busy
    Busy,
    /// Parameter binding failed
    Bind,
    /// Transaction state misuse
    Transaction,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table or column name is a reserved word
    ReservedName,
    /// Name is not a plain SQL identifier
    InvalidIdentifier,
    /// Table not found during reflection
    TableNotFound,
    /// Operation is not available for the dialect
    Unsupported,
    /// Definition is internally inconsistent
    Invalid,
}

#[derive(Debug)]
pub struct UsageError {
    pub kind: UsageErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorKind {
    /// join/where before `from`
    NoBaseTable,
    /// A value that cannot be bound as a filter
    UnsupportedValue,
    /// Unknown join type
    UnsupportedJoinType,
    /// Unknown comparison operator
    UnsupportedOperator,
    /// Wrong number of values (e.g. BETWEEN)
    InvalidArity,
    /// Relation name not declared on the record type
    UnknownRelation,
}

#[derive(Debug)]
pub struct RecordError {
    pub kind: RecordErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordErrorKind {
    /// Single primary key requested on a composite-key type
    CompositeKey,
    /// The record has no identity yet
    MissingIdentity,
    /// Exactly-one fetch matched no rows
    NotFound,
    /// Exactly-one fetch matched several rows
    MultipleRows,
    /// Record type is not registered
    UnknownType,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

static SQLSTATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SQLSTATE\[([0-9A-Za-z]{5})\]:?\s*(.*)").expect("valid SQLSTATE regex")
});

static NEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"near '([^']*)'|near "([^"]*)""#).expect("valid near regex")
});

impl QueryError {
    /// Build a normalized error from a raw driver message.
    ///
    /// `SQLSTATE[xxxxx]: message` is split into the state code and message;
    /// the `near '...'` fragment is extracted when present.
    pub fn from_message(message: impl Into<String>, sql: Option<&str>) -> Self {
        let raw = message.into();
        let (sqlstate, message) = match SQLSTATE_RE.captures(&raw) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str().to_uppercase()),
                caps.get(2)
                    .map_or_else(|| raw.clone(), |m| m.as_str().to_string()),
            ),
            None => (None, raw.clone()),
        };
        let kind = sqlstate
            .as_deref()
            .map_or(QueryErrorKind::Database, kind_for_sqlstate);
        let mut err = Self {
            kind,
            sql: sql.map(str::to_string),
            sqlstate,
            message,
            near: None,
            source: None,
        };
        err.near = extract_near(&err.message);
        if err.near.is_some() && err.kind == QueryErrorKind::Database {
            err.kind = QueryErrorKind::Syntax;
        }
        err
    }

    /// Attach the SQL text and fill in anything the driver left out.
    pub fn annotate(mut self, sql: &str) -> Self {
        if self.sql.is_none() {
            self.sql = Some(sql.to_string());
        }
        if self.sqlstate.is_none() {
            if let Some(caps) = SQLSTATE_RE.captures(&self.message) {
                self.sqlstate = caps.get(1).map(|m| m.as_str().to_uppercase());
                if let Some(rest) = caps.get(2) {
                    self.message = rest.as_str().to_string();
                }
            }
        }
        if self.near.is_none() {
            self.near = extract_near(&self.message);
        }
        self
    }

    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.sqlstate.as_deref(), Some("23505" | "23000"))
            && self.message.to_lowercase().contains("unique")
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23503")
            || self.message.to_lowercase().contains("foreign key")
    }
}

fn extract_near(message: &str) -> Option<String> {
    NEAR_RE.captures(message).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    })
}

fn kind_for_sqlstate(state: &str) -> QueryErrorKind {
    match state.get(..2) {
        Some("23") => QueryErrorKind::Constraint,
        Some("42") => {
            if matches!(state, "42S02" | "42S22" | "42P01" | "42703") {
                QueryErrorKind::NotFound
            } else if state == "42000" || state == "42601" {
                QueryErrorKind::Syntax
            } else {
                QueryErrorKind::Permission
            }
        }
        Some("22") => QueryErrorKind::DataTruncation,
        Some("40") => QueryErrorKind::Busy,
        Some("25") => QueryErrorKind::Transaction,
        _ => QueryErrorKind::Database,
    }
}

impl Error {
    /// Shorthand for a usage error.
    pub fn usage(kind: UsageErrorKind, message: impl Into<String>) -> Self {
        Error::Usage(UsageError {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for a record error.
    pub fn record(kind: RecordErrorKind, message: impl Into<String>) -> Self {
        Error::Record(RecordError {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for a schema error.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Attach the offending SQL to a query error; other errors pass through.
    #[must_use]
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            Error::Query(q) => Error::Query(q.annotate(sql)),
            other => other,
        }
    }

    /// Get SQLSTATE if available (e.g., "23000" for an integrity violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Get the `near '...'` fragment of a syntax error, if available
    pub fn near(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.near.as_deref(),
            _ => None,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)?;
                } else {
                    write!(f, "Query error: {}", e.message)?;
                }
                if let Some(sql) = &e.sql {
                    write!(f, " [SQL: {}]", sql)?;
                }
                Ok(())
            }
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Usage(e) => write!(f, "Usage error: {}", e.message),
            Error::Record(e) => write!(f, "Record error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::Usage(err)
    }
}

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Error::Record(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for SQLRecord operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_extracted_from_message() {
        let err = QueryError::from_message(
            "SQLSTATE[42S02]: Base table or view not found: 1146 Table 'app.nope' doesn't exist",
            Some("SELECT * FROM nope"),
        );
        assert_eq!(err.sqlstate.as_deref(), Some("42S02"));
        assert_eq!(err.kind, QueryErrorKind::NotFound);
        assert!(err.message.starts_with("Base table or view not found"));
        assert_eq!(err.sql.as_deref(), Some("SELECT * FROM nope"));
    }

    #[test]
    fn test_near_clause_mysql_style() {
        let err = QueryError::from_message(
            "SQLSTATE[42000]: Syntax error or access violation: 1064 You have an error in \
             your SQL syntax; check the manual near 'FROMM post' at line 1",
            None,
        );
        assert_eq!(err.near.as_deref(), Some("FROMM post"));
        assert_eq!(err.kind, QueryErrorKind::Syntax);
    }

    #[test]
    fn test_near_clause_sqlite_style() {
        let err = QueryError::from_message("near \"FROMM\": syntax error", None);
        assert_eq!(err.sqlstate, None);
        assert_eq!(err.near.as_deref(), Some("FROMM"));
        assert_eq!(err.kind, QueryErrorKind::Syntax);
    }

    #[test]
    fn test_annotate_keeps_driver_fields() {
        let err = QueryError {
            kind: QueryErrorKind::Constraint,
            sql: None,
            sqlstate: Some("23000".to_string()),
            message: "UNIQUE constraint failed: user.email".to_string(),
            near: None,
            source: None,
        }
        .annotate("INSERT INTO user (email) VALUES (:p0)");

        assert_eq!(err.sqlstate.as_deref(), Some("23000"));
        assert!(err.is_unique_violation());
        assert_eq!(
            err.sql.as_deref(),
            Some("INSERT INTO user (email) VALUES (:p0)")
        );
    }

    #[test]
    fn test_error_accessors_and_display() {
        let err = Error::Query(QueryError::from_message(
            "SQLSTATE[HY000]: General error",
            Some("SELECT 1"),
        ));
        assert_eq!(err.sqlstate(), Some("HY000"));
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert_eq!(
            err.to_string(),
            "Query error (SQLSTATE HY000): General error [SQL: SELECT 1]"
        );

        let usage = Error::usage(UsageErrorKind::NoBaseTable, "join before from");
        assert!(usage.is_usage());
        assert_eq!(usage.sqlstate(), None);
    }
}
