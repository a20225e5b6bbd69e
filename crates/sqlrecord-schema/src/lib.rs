//! Schema introspection and migration support for SQLRecord.
//!
//! This crate provides:
//! - Database introspection of tables, columns, primary and foreign keys
//! - Column type guessing from naming conventions
//! - Reserved-word and identifier validation
//! - DDL generation for SQLite, MySQL, PostgreSQL and SQL Server, including
//!   the SQLite copy-rename rebuild
//! - A [`Migrator`] that previews or executes DDL batches

pub mod ddl;
pub mod guess;
pub mod introspect;
pub mod migrate;
pub mod reserved;

pub use ddl::{
    AlterDefinition, DdlGenerator, FieldDef, MssqlDdlGenerator, MysqlDdlGenerator,
    PostgresDdlGenerator, SqliteDdlGenerator, TableDefinition, drop_table_sql,
    generator_for_dialect,
};
pub use guess::{GuessedType, guess_type};
pub use introspect::{ColumnMeta, ForeignKeyMeta, Introspector, TableShape};
pub use migrate::{DdlMode, Migrator};
pub use reserved::{check_identifier, is_reserved};
