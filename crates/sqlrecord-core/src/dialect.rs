//! SQL dialects and identifier quoting.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of SQL dialects the data-access layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    #[default]
    Sqlite,
    Postgres,
    Mssql,
}

impl Dialect {
    /// Parse a driver name as it appears in a DSN prefix.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mssql" | "sqlsrv" | "dblib" => Ok(Dialect::Mssql),
            other => Err(Error::config(format!("unknown database driver '{}'", other))),
        }
    }

    /// Canonical lower-case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mssql => "mssql",
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// - MySQL: backticks
    /// - SQL Server: square brackets
    /// - SQLite/PostgreSQL: double quotes
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Mssql => format!("[{}]", name.replace(']', "]]")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Statement that opens a transaction.
    pub const fn begin_statement(&self) -> &'static str {
        match self {
            Dialect::Mysql => "START TRANSACTION",
            Dialect::Mssql => "BEGIN TRANSACTION",
            Dialect::Sqlite | Dialect::Postgres => "BEGIN",
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dialect::parse(s)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitize a SQL identifier by removing non-alphanumeric/underscore characters.
///
/// Used where quoting is not possible, e.g. `PRAGMA table_info(...)`.
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
