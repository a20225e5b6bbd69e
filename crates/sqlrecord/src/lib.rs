//! SQLRecord - active-record data access for SQL databases.
//!
//! SQLRecord bundles four layers behind one facade:
//!
//! - a lazily-connecting [`Connection`] with named parameters, a statement
//!   log and transaction control
//! - a fluent [`Query`] builder that joins referenced tables on its own
//! - schema reflection and cross-dialect DDL ([`Introspector`], [`Migrator`])
//! - an active-record [`Mapper`] with relation caching and batch prefetch
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlrecord::prelude::*;
//!
//! let conn = sqlrecord::connect("sqlite::memory:")?;
//! let types = TypeRegistry::new();
//! let mapper = Mapper::new(&conn, &types);
//!
//! mapper.register_with_schema(RecordType::builder("author").columns(["name"]))?;
//! mapper.register_with_schema(
//!     RecordType::builder("post").columns(["title"]).has_one("author"),
//! )?;
//! mapper.create_table_for("author", DdlMode::Execute)?;
//! mapper.create_table_for("post", DdlMode::Execute)?;
//!
//! let mut post = Record::new(types.require("post")?).with("title", "Hello");
//! post.set_one("author", Some(Record::new(types.require("author")?).with("name", "Jane")));
//! mapper.save(&mut post)?;
//!
//! let mut posts = Query::table(&conn, "post")
//!     .with_types(&types)
//!     .filter("author.name", "Jane")?;
//! posts.prefetch("author")?;
//! ```

pub use sqlrecord_core::{
    ColumnInfo, Connection, ConnectionError, ConnectionErrorKind, ConnectionParams,
    ConnectionRegistry, Connector, DEFAULT_CONNECTION, Dialect, Driver, Error, Field, FromValue,
    JoinTable, Params, PreparedStatement, QueryError, QueryErrorKind, Record, RecordError,
    RecordErrorKind, RecordType, RecordTypeBuilder, Related, Relation, RelationKind, Result, Row,
    SchemaError, SchemaErrorKind, StatementLog, TypeRegistry, UsageError, UsageErrorKind, Value,
};
pub use sqlrecord_orm::Mapper;
pub use sqlrecord_query::{
    DeleteBuilder, InsertBuilder, Join, JoinKind, Operator, OrderBy, Query, UpdateBuilder, eager,
};
pub use sqlrecord_schema::{
    AlterDefinition, ColumnMeta, DdlMode, FieldDef, ForeignKeyMeta, Introspector, Migrator,
    TableDefinition, TableShape, guess_type,
};
pub use sqlrecord_sqlite::{SqliteConnector, SqliteDriver};

use std::sync::Arc;

/// Open a connection for `dsn`.
///
/// `sqlite:` DSNs get the bundled SQLite driver. Other dialects need a
/// [`Connector`] from the caller; see [`connect_with`]. The native handle is
/// opened on first use.
pub fn connect(dsn: &str) -> Result<Connection> {
    let params = ConnectionParams::parse(dsn)?;
    tracing::debug!(dsn = %params.to_dsn(), "Creating connection");
    match params.dialect {
        Dialect::Sqlite => Ok(Connection::new(params, Arc::new(SqliteConnector))),
        other => Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::NoDriver,
            message: format!("no built-in driver for {}; use connect_with", other),
            source: None,
        })),
    }
}

/// Open a connection for `dsn` through `connector`.
pub fn connect_with(dsn: &str, connector: Arc<dyn Connector>) -> Result<Connection> {
    Connection::from_dsn(dsn, connector)
}

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Connection, ConnectionParams, DdlMode, Dialect, Error, Field, Mapper, Params, Query,
        Record, RecordType, Related, RelationKind, Result, Row, TableDefinition, TypeRegistry,
        Value,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_lazy() {
        let conn = connect("sqlite::memory:").unwrap();
        assert_eq!(conn.dialect(), Dialect::Sqlite);
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_connect_without_driver() {
        let err = connect("mysql:host=db;dbname=app").unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ref e) if e.kind == ConnectionErrorKind::NoDriver
        ));
    }
}
