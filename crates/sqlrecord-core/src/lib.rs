//! Core types for SQLRecord.
//!
//! This crate holds the pieces every other layer shares:
//!
//! - [`Connection`], the lazily-connecting connection manager, with its
//!   [`Driver`]/[`Connector`] seams, statement log and transaction control
//! - [`ConnectionParams`] for DSN strings and structured configuration
//! - [`Value`], [`Row`] and [`Params`] for data moving in and out
//! - [`RecordType`], [`Relation`] and [`Record`] describing mapped tables
//! - the [`Error`] taxonomy shared by all layers

pub mod connection;
pub mod dialect;
pub mod driver;
pub mod dsn;
pub mod error;
pub mod model;
pub mod params;
pub mod record;
pub mod registry;
pub mod relationship;
pub mod row;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod value;

pub use connection::{Connection, PreparedStatement, StatementLog, render_sql};
pub use dialect::{Dialect, sanitize_identifier};
pub use driver::{Connector, Driver, NoConnector, standard_quote};
pub use dsn::ConnectionParams;
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind,
    RecordError, RecordErrorKind, Result, SchemaError, SchemaErrorKind, TypeError, UsageError,
    UsageErrorKind,
};
pub use model::{Accessor, Getter, RecordType, RecordTypeBuilder, Setter, TypeRegistry};
pub use params::{Params, placeholder_names};
pub use record::{Field, Record, Related};
pub use registry::{ConnectionRegistry, DEFAULT_CONNECTION};
pub use relationship::{
    JoinTable, Relation, RelationKind, foreign_key_for, join_table_name, singularize,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
