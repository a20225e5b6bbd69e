//! SQLite DDL generator.
//!
//! SQLite can append columns but cannot drop them or change constraints in
//! place. Those changes rebuild the table through a temporary copy.

use super::{AlterDefinition, DdlGenerator, FieldDef, TableDefinition, generate_create_table};
use crate::introspect::{ColumnMeta, TableShape};
use sqlrecord_core::Dialect;

/// DDL generator for SQLite.
pub struct SqliteDdlGenerator;

impl DdlGenerator for SqliteDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn auto_increment_column(&self, name: &str) -> String {
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", name)
    }

    fn inline_primary_key(&self) -> bool {
        true
    }

    fn alter_table(&self, current: &TableShape, alter: &AlterDefinition) -> Vec<String> {
        tracing::debug!(dialect = "sqlite", table = %current.name, "Generating ALTER TABLE DDL");

        let statements = if alter.remove_fields.is_empty() && !alter.changes_keys() {
            alter
                .add_fields
                .iter()
                .map(|field| self.add_column(&current.name, field))
                .collect()
        } else {
            sqlite_copy_rename(current, alter)
        };

        for stmt in &statements {
            tracing::trace!(sql = %stmt, "Generated SQLite DDL statement");
        }
        statements
    }
}

/// Carry a reflected column into a new definition.
fn field_from_meta(column: &ColumnMeta, current: &TableShape) -> FieldDef {
    // A lone INTEGER `id` key is the rowid alias; regenerate it as such.
    if column.name() == "id"
        && current.primary_keys == ["id"]
        && column.sql_type().eq_ignore_ascii_case("INTEGER")
    {
        return FieldDef::new("id");
    }
    FieldDef {
        name: column.name().to_string(),
        sql_type: Some(column.sql_type().to_string()).filter(|t| !t.is_empty()),
        nullable: column.nullable() || column.primary_key(),
        default: column.default().map(str::to_string),
    }
}

/// The altered definition of `current`.
fn altered_definition(current: &TableShape, alter: &AlterDefinition) -> TableDefinition {
    let kept = |name: &str| !alter.remove_fields.iter().any(|c| c.as_str() == name);

    let mut fields: Vec<FieldDef> = current
        .columns
        .iter()
        .filter(|c| kept(c.name()))
        .map(|c| field_from_meta(c, current))
        .collect();
    fields.extend(alter.add_fields.iter().cloned());

    let mut foreign_keys: Vec<_> = current
        .foreign_keys
        .iter()
        .filter(|fk| kept(&fk.column) && !alter.remove_keys.contains(&fk.column))
        .cloned()
        .collect();
    foreign_keys.extend(alter.add_keys.iter().cloned());

    TableDefinition {
        name: current.name.clone(),
        fields,
        primary_keys: current
            .primary_keys
            .iter()
            .filter(|c| kept(c.as_str()))
            .cloned()
            .collect(),
        foreign_keys,
    }
}

/// Rebuild `current` with the altered column set as one batch.
///
/// Rows are parked in a temporary table, the original is dropped and
/// recreated, and the shared columns are copied back. No statement in the
/// batch drops a column.
fn sqlite_copy_rename(current: &TableShape, alter: &AlterDefinition) -> Vec<String> {
    let table = current.name.as_str();
    let backup = format!("{}_backup", table);
    let shared: Vec<&str> = current
        .columns
        .iter()
        .map(ColumnMeta::name)
        .filter(|name| !alter.remove_fields.iter().any(|c| c.as_str() == *name))
        .collect();
    let new_table = altered_definition(current, alter);
    let create = generate_create_table(&SqliteDdlGenerator, &new_table, false);

    // No surviving column means no rows worth carrying over.
    if shared.is_empty() {
        return vec![
            "PRAGMA foreign_keys=OFF".to_string(),
            "BEGIN".to_string(),
            format!("DROP TABLE {}", table),
            create,
            "COMMIT".to_string(),
            "PRAGMA foreign_keys=ON".to_string(),
        ];
    }
    let shared = shared.join(", ");

    vec![
        "PRAGMA foreign_keys=OFF".to_string(),
        "BEGIN".to_string(),
        format!("CREATE TEMPORARY TABLE {} ({})", backup, shared),
        format!("INSERT INTO {} ({}) SELECT {} FROM {}", backup, shared, shared, table),
        format!("DROP TABLE {}", table),
        create,
        format!("INSERT INTO {} ({}) SELECT {} FROM {}", table, shared, shared, backup),
        format!("DROP TABLE {}", backup),
        "COMMIT".to_string(),
        "PRAGMA foreign_keys=ON".to_string(),
    ]
}
