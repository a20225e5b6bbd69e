//! SQLite driver for SQLRecord.
//!
//! This crate provides the native SQLite handle behind a
//! [`sqlrecord_core::Connection`]. SQLite itself is compiled from the bundled
//! amalgamation, so no system library is needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlrecord_core::Connection;
//! use sqlrecord_sqlite::SqliteConnector;
//! use std::sync::Arc;
//!
//! let conn = Connection::from_dsn("sqlite::memory:", Arc::new(SqliteConnector))?;
//! conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-----------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Null` | NULL |
//! | `Json`, `Array` | TEXT (JSON) |
//!
//! Placeholders bind by name, so a statement's `:name` markers may appear in
//! any order and repeat.

// The driver wraps the C API directly.
#![allow(unsafe_code)]

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnector, SqliteDriver};

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_library_is_sqlite3() {
        assert!(sqlite_version().starts_with("3."), "got {}", sqlite_version());
    }
}
