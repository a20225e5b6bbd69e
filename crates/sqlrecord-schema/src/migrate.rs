//! Applying DDL through a connection.

use crate::ddl::{AlterDefinition, TableDefinition, drop_table_sql};
use crate::introspect::{ForeignKeyMeta, Introspector};
use sqlrecord_core::{Connection, Error, Result, SchemaErrorKind};

/// Whether generated DDL is only returned or also executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DdlMode {
    /// Return the DDL batch without touching the database
    #[default]
    Preview,
    /// Execute the batch, then return it
    Execute,
}

/// Creates and alters tables on one connection.
///
/// Every operation returns the exact DDL batch so callers can version it.
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'a> {
    conn: &'a Connection,
    mode: DdlMode,
}

impl<'a> Migrator<'a> {
    /// A migrator in [`DdlMode::Preview`].
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            mode: DdlMode::Preview,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: DdlMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn create_table(&self, def: &TableDefinition) -> Result<Vec<String>> {
        let sql = def.create_table_sql(self.conn.dialect())?;
        self.apply(vec![sql])
    }

    /// Reflect `table` and move it to the altered shape.
    pub fn alter_table(&self, table: &str, alter: &AlterDefinition) -> Result<Vec<String>> {
        let shape = Introspector::new(self.conn).describe(table)?;
        if shape.columns.is_empty() {
            return Err(Error::schema(
                SchemaErrorKind::TableNotFound,
                format!("table '{}' not found", table),
            ));
        }
        let batch = alter.alter_table_sql(self.conn.dialect(), &shape)?;
        self.apply(batch)
    }

    /// Add and drop foreign keys on `table`.
    ///
    /// `remove` names the owning columns of the keys to drop.
    pub fn alter_keys(
        &self,
        table: &str,
        add: Vec<ForeignKeyMeta>,
        remove: Vec<String>,
    ) -> Result<Vec<String>> {
        let alter = AlterDefinition {
            add_keys: add,
            remove_keys: remove,
            ..AlterDefinition::default()
        };
        self.alter_table(table, &alter)
    }

    pub fn drop_table(&self, table: &str) -> Result<Vec<String>> {
        let sql = drop_table_sql(table, self.conn.dialect())?;
        self.apply(vec![sql])
    }

    fn apply(&self, mut batch: Vec<String>) -> Result<Vec<String>> {
        // An open transaction already brackets the batch, and SQLite ignores
        // the foreign-key pragma inside one.
        if self.conn.in_transaction() {
            batch.retain(|sql| !is_bracket(sql));
        }
        tracing::debug!(
            dialect = %self.conn.dialect(),
            mode = ?self.mode,
            statements = batch.len(),
            "Applying DDL batch"
        );
        if self.mode == DdlMode::Preview {
            return Ok(batch);
        }
        for (i, sql) in batch.iter().enumerate() {
            if let Err(err) = self.conn.execute(sql) {
                self.abandon(&batch[..i]);
                return Err(err);
            }
        }
        Ok(batch)
    }

    /// Undo the parts of a half-applied batch that leave the connection in an
    /// odd state.
    fn abandon(&self, applied: &[String]) {
        if applied.iter().any(|s| s == "BEGIN") {
            if let Err(err) = self.conn.execute("ROLLBACK") {
                tracing::warn!(error = %err, "Rollback of failed DDL batch failed");
            }
        }
        if applied.iter().any(|s| s == "PRAGMA foreign_keys=OFF") {
            if let Err(err) = self.conn.execute("PRAGMA foreign_keys=ON") {
                tracing::warn!(error = %err, "Re-enabling foreign keys failed");
            }
        }
    }
}

fn is_bracket(sql: &str) -> bool {
    matches!(
        sql,
        "BEGIN" | "COMMIT" | "PRAGMA foreign_keys=OFF" | "PRAGMA foreign_keys=ON"
    )
}
