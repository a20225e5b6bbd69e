//! SQL Server DDL generator.
//!
//! SQL Server spells column addition `ADD <column>` without the `COLUMN`
//! keyword.

use super::{DdlGenerator, FieldDef, format_column_def};
use sqlrecord_core::Dialect;

/// DDL generator for SQL Server.
pub struct MssqlDdlGenerator;

impl DdlGenerator for MssqlDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    fn auto_increment_column(&self, name: &str) -> String {
        format!("{} INT IDENTITY(1,1)", name)
    }

    fn drop_table(&self, table: &str) -> String {
        format!(
            "IF OBJECT_ID('{}', 'U') IS NOT NULL DROP TABLE {}",
            table, table
        )
    }

    fn add_column(&self, table: &str, field: &FieldDef) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            table,
            format_column_def(field, Dialect::Mssql)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{AlterDefinition, TableDefinition};
    use crate::introspect::{ColumnMeta, ForeignKeyMeta, TableShape};

    #[test]
    fn test_identity_column() {
        let sql = TableDefinition::new("author")
            .fields(["id", "name"])
            .create_table_sql(Dialect::Mssql)
            .unwrap();
        assert!(sql.contains("  id INT IDENTITY(1,1),"));
        assert!(sql.contains("  name NVARCHAR(255),"));
        assert!(sql.contains("  PRIMARY KEY (id)"));
    }

    #[test]
    fn test_alter_statements() {
        let current = TableShape {
            name: "post".to_string(),
            columns: vec![
                ColumnMeta::new("id", "int", false, None, true),
                ColumnMeta::new("author_id", "int", true, None, false),
            ],
            primary_keys: vec!["id".to_string()],
            foreign_keys: vec![ForeignKeyMeta {
                name: Some("FK_post_author".to_string()),
                ..ForeignKeyMeta::new("author_id", "author")
            }],
        };
        let stmts = AlterDefinition::new()
            .remove_field("author_id")
            .add_field("has_cover")
            .alter_table_sql(Dialect::Mssql, &current)
            .unwrap();
        assert_eq!(
            stmts,
            vec![
                "ALTER TABLE post DROP CONSTRAINT FK_post_author",
                "ALTER TABLE post DROP COLUMN author_id",
                "ALTER TABLE post ADD has_cover BIT",
            ]
        );
    }
}
