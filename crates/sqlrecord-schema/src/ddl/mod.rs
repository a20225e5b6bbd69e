//! DDL generation from table definitions.
//!
//! [`TableDefinition`] and [`AlterDefinition`] describe the desired change;
//! a per-dialect [`DdlGenerator`] turns them into executable statements.
//! Identifiers are validated up front and emitted bare.

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use mssql::MssqlDdlGenerator;
pub use mysql::MysqlDdlGenerator;
pub use postgres::PostgresDdlGenerator;
pub use sqlite::SqliteDdlGenerator;

use crate::guess::guess_type;
use crate::introspect::{ForeignKeyMeta, TableShape};
use crate::reserved::check_identifier;
use sqlrecord_core::{Dialect, Error, Result, SchemaErrorKind};

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    /// Declared type; guessed from the name when absent.
    pub sql_type: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: None,
            nullable: true,
            default: None,
        }
    }

    pub fn typed(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            sql_type: Some(sql_type.into()),
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Default expression, emitted verbatim.
    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

impl From<&str> for FieldDef {
    fn from(name: &str) -> Self {
        FieldDef::new(name)
    }
}

impl From<String> for FieldDef {
    fn from(name: String) -> Self {
        FieldDef::new(name)
    }
}

/// A table to create.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Explicit primary key; `id` is implied when empty and present.
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<FieldDef>) -> Self {
        self.fields.push(field.into());
        self
    }

    #[must_use]
    pub fn fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldDef>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeyMeta) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// The primary key the table will actually get.
    pub fn effective_primary_key(&self) -> Vec<String> {
        if self.primary_keys.is_empty() && self.fields.iter().any(|f| f.name == "id") {
            vec!["id".to_string()]
        } else {
            self.primary_keys.clone()
        }
    }

    fn is_auto_increment(&self, field: &FieldDef) -> bool {
        field.sql_type.is_none()
            && field.name == "id"
            && (self.primary_keys.is_empty() || self.primary_keys == ["id"])
    }

    /// Check names before any DDL is produced.
    pub fn validate(&self, dialect: Dialect) -> Result<()> {
        check_identifier(&self.name, dialect)?;
        if self.fields.is_empty() {
            return Err(invalid(format!("table '{}' has no columns", self.name)));
        }
        for field in &self.fields {
            check_identifier(&field.name, dialect)?;
        }
        let has = |name: &str| self.fields.iter().any(|f| f.name == name);
        for pk in &self.primary_keys {
            if !has(pk) {
                return Err(invalid(format!(
                    "primary key column '{}' is not a column of '{}'",
                    pk, self.name
                )));
            }
        }
        for fk in &self.foreign_keys {
            check_identifier(&fk.table, dialect)?;
            check_identifier(&fk.referenced_column, dialect)?;
            if !has(&fk.column) {
                return Err(invalid(format!(
                    "foreign key column '{}' is not a column of '{}'",
                    fk.column, self.name
                )));
            }
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` for `dialect`.
    pub fn create_table_sql(&self, dialect: Dialect) -> Result<String> {
        self.validate(dialect)?;
        Ok(generator_for_dialect(dialect).create_table(self))
    }
}

/// Column and key changes to an existing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlterDefinition {
    pub add_fields: Vec<FieldDef>,
    pub remove_fields: Vec<String>,
    pub add_keys: Vec<ForeignKeyMeta>,
    /// Foreign keys to drop, by owning column.
    pub remove_keys: Vec<String>,
}

impl AlterDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add_field(mut self, field: impl Into<FieldDef>) -> Self {
        self.add_fields.push(field.into());
        self
    }

    #[must_use]
    pub fn remove_field(mut self, column: impl Into<String>) -> Self {
        self.remove_fields.push(column.into());
        self
    }

    #[must_use]
    pub fn add_key(mut self, fk: ForeignKeyMeta) -> Self {
        self.add_keys.push(fk);
        self
    }

    #[must_use]
    pub fn remove_key(mut self, column: impl Into<String>) -> Self {
        self.remove_keys.push(column.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_fields.is_empty()
            && self.remove_fields.is_empty()
            && self.add_keys.is_empty()
            && self.remove_keys.is_empty()
    }

    pub fn changes_keys(&self) -> bool {
        !self.add_keys.is_empty() || !self.remove_keys.is_empty()
    }

    fn validate(&self, dialect: Dialect, current: &TableShape) -> Result<()> {
        for field in &self.add_fields {
            check_identifier(&field.name, dialect)?;
            if current.column(&field.name).is_some() {
                return Err(invalid(format!(
                    "column '{}' already exists on '{}'",
                    field.name, current.name
                )));
            }
        }
        for column in &self.remove_fields {
            if current.column(column).is_none() {
                return Err(invalid(format!(
                    "no column '{}' on '{}'",
                    column, current.name
                )));
            }
        }
        for fk in &self.add_keys {
            check_identifier(&fk.table, dialect)?;
            check_identifier(&fk.referenced_column, dialect)?;
            let added = self.add_fields.iter().any(|f| f.name == fk.column);
            if current.column(&fk.column).is_none() && !added {
                return Err(invalid(format!(
                    "foreign key column '{}' is not a column of '{}'",
                    fk.column, current.name
                )));
            }
        }
        for column in &self.remove_keys {
            if !current.foreign_keys.iter().any(|fk| &fk.column == column) {
                return Err(invalid(format!(
                    "no foreign key on '{}.{}'",
                    current.name, column
                )));
            }
        }
        Ok(())
    }

    /// The DDL batch that moves `current` to the altered shape.
    pub fn alter_table_sql(&self, dialect: Dialect, current: &TableShape) -> Result<Vec<String>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.validate(dialect, current)?;
        Ok(generator_for_dialect(dialect).alter_table(current, self))
    }
}

/// `DROP TABLE IF EXISTS` for `dialect`.
pub fn drop_table_sql(table: &str, dialect: Dialect) -> Result<String> {
    check_identifier(table, dialect)?;
    Ok(generator_for_dialect(dialect).drop_table(table))
}

fn invalid(message: String) -> Error {
    Error::schema(SchemaErrorKind::Invalid, message)
}

/// Generates DDL statements for one dialect.
///
/// Inputs are validated by the callers in this module.
pub trait DdlGenerator {
    fn dialect(&self) -> Dialect;

    /// Column definition of an auto-increment `id`.
    fn auto_increment_column(&self, name: &str) -> String;

    /// Whether [`auto_increment_column`](Self::auto_increment_column) already
    /// declares the primary key.
    fn inline_primary_key(&self) -> bool {
        false
    }

    fn create_table(&self, def: &TableDefinition) -> String {
        generate_create_table(self, def, true)
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", table)
    }

    fn add_column(&self, table: &str, field: &FieldDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table,
            format_column_def(field, self.dialect())
        )
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", table, column)
    }

    fn add_foreign_key(&self, table: &str, fk: &ForeignKeyMeta) -> String {
        format!("ALTER TABLE {} ADD {}", table, format_fk_constraint(table, fk))
    }

    fn drop_foreign_key(&self, table: &str, fk: &ForeignKeyMeta) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table,
            fk.constraint_name(table)
        )
    }

    fn alter_table(&self, current: &TableShape, alter: &AlterDefinition) -> Vec<String> {
        generate_alter_in_place(self, current, alter)
    }
}

/// Create a DDL generator for the given dialect.
pub fn generator_for_dialect(dialect: Dialect) -> Box<dyn DdlGenerator> {
    match dialect {
        Dialect::Sqlite => Box::new(SqliteDdlGenerator),
        Dialect::Mysql => Box::new(MysqlDdlGenerator),
        Dialect::Postgres => Box::new(PostgresDdlGenerator),
        Dialect::Mssql => Box::new(MssqlDdlGenerator),
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Resolved type of a column outside the auto-increment case.
fn column_type(field: &FieldDef, dialect: Dialect) -> String {
    field
        .sql_type
        .clone()
        .unwrap_or_else(|| guess_type(&field.name, dialect).sql_type)
}

/// Format a column definition for CREATE TABLE or ADD COLUMN.
fn format_column_def(field: &FieldDef, dialect: Dialect) -> String {
    let mut parts = vec![field.name.clone(), column_type(field, dialect)];
    if !field.nullable {
        parts.push("NOT NULL".to_string());
    }
    if let Some(ref default) = field.default {
        parts.push(format!("DEFAULT {}", default));
    }
    parts.join(" ")
}

/// Format a named foreign key constraint clause.
fn format_fk_constraint(table: &str, fk: &ForeignKeyMeta) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        fk.constraint_name(table),
        fk.column,
        fk.table,
        fk.referenced_column
    )
}

/// Generate CREATE TABLE SQL.
fn generate_create_table<G: DdlGenerator + ?Sized>(
    generator: &G,
    def: &TableDefinition,
    if_not_exists: bool,
) -> String {
    let dialect = generator.dialect();
    tracing::debug!(
        dialect = %dialect,
        table = %def.name,
        columns = def.fields.len(),
        "Generating CREATE TABLE DDL"
    );

    let mut parts = Vec::new();
    let mut inline_pk = false;
    for field in &def.fields {
        if def.is_auto_increment(field) {
            parts.push(format!("  {}", generator.auto_increment_column(&field.name)));
            inline_pk = generator.inline_primary_key();
        } else {
            parts.push(format!("  {}", format_column_def(field, dialect)));
        }
    }

    let pk = def.effective_primary_key();
    if !pk.is_empty() && !inline_pk {
        parts.push(format!("  PRIMARY KEY ({})", pk.join(", ")));
    }

    for fk in &def.foreign_keys {
        parts.push(format!("  {}", format_fk_constraint(&def.name, fk)));
    }

    let sql = format!(
        "CREATE TABLE {}{} (\n{}\n)",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        def.name,
        parts.join(",\n")
    );

    tracing::trace!(sql = %sql, "Generated CREATE TABLE statement");
    sql
}

/// ALTER statements for dialects that change columns and keys in place.
///
/// Keys go first so no constraint outlives its column.
fn generate_alter_in_place<G: DdlGenerator + ?Sized>(
    generator: &G,
    current: &TableShape,
    alter: &AlterDefinition,
) -> Vec<String> {
    let table = current.name.as_str();
    let mut stmts = Vec::new();

    for fk in &current.foreign_keys {
        let dropped_key = alter.remove_keys.contains(&fk.column);
        let dropped_column = alter.remove_fields.contains(&fk.column);
        if dropped_key || dropped_column {
            stmts.push(generator.drop_foreign_key(table, fk));
        }
    }
    for column in &alter.remove_fields {
        stmts.push(generator.drop_column(table, column));
    }
    for field in &alter.add_fields {
        stmts.push(generator.add_column(table, field));
    }
    for fk in &alter.add_keys {
        stmts.push(generator.add_foreign_key(table, fk));
    }

    tracing::debug!(
        dialect = %generator.dialect(),
        table = %table,
        statements = stmts.len(),
        "Generated ALTER TABLE DDL"
    );
    stmts
}
