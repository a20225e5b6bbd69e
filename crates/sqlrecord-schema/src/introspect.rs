//! Database introspection.
//!
//! Each listing dispatches on the connection's dialect to the matching
//! reflection query and normalizes the result:
//!
//! - SQLite: `sqlite_master`, `PRAGMA table_info`, `PRAGMA foreign_key_list`
//! - MySQL: `information_schema` scoped to `DATABASE()`
//! - PostgreSQL: `information_schema` joined against the constraint views
//! - SQL Server: `INFORMATION_SCHEMA` views plus `sys.foreign_keys`

use sqlrecord_core::{Connection, Dialect, Params, Result, Row, sanitize_identifier};

/// Reflected metadata of one column.
///
/// Only produced by the [`Introspector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    name: String,
    sql_type: String,
    nullable: bool,
    default: Option<String>,
    primary_key: bool,
    foreign_key: Option<(String, String)>,
}

impl ColumnMeta {
    pub(crate) fn new(
        name: impl Into<String>,
        sql_type: impl Into<String>,
        nullable: bool,
        default: Option<String>,
        primary_key: bool,
    ) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable,
            default,
            primary_key,
            foreign_key: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type as reported by the database.
    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn primary_key(&self) -> bool {
        self.primary_key
    }

    /// Referenced `(table, column)` when the column is a foreign key.
    pub fn foreign_key(&self) -> Option<(&str, &str)> {
        self.foreign_key
            .as_ref()
            .map(|(t, c)| (t.as_str(), c.as_str()))
    }
}

/// A foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyMeta {
    /// Constraint name when the database reports one
    pub name: Option<String>,
    pub column: String,
    /// Referenced table
    pub table: String,
    pub referenced_column: String,
}

impl ForeignKeyMeta {
    /// `column` referencing `table.id`.
    pub fn new(column: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: None,
            column: column.into(),
            table: table.into(),
            referenced_column: "id".to_string(),
        }
    }

    #[must_use]
    pub fn references(mut self, column: impl Into<String>) -> Self {
        self.referenced_column = column.into();
        self
    }

    /// Reported name, or the conventional `fk_<table>_<column>_<reference>`.
    pub fn constraint_name(&self, owner_table: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("fk_{}_{}_{}", owner_table, self.column, self.table))
    }
}

/// The reflected shape of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

impl TableShape {
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Reads schema metadata through a connection.
#[derive(Debug, Clone, Copy)]
pub struct Introspector<'a> {
    conn: &'a Connection,
}

fn table_param(table: &str) -> Params {
    Params::new().with("table", table)
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get_named::<Option<String>>(column).ok().flatten()
}

fn yes(row: &Row, column: &str) -> bool {
    text(row, column).is_some_and(|v| v.eq_ignore_ascii_case("YES"))
}

impl<'a> Introspector<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }

    /// Names of all user tables, sorted.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let sql = match self.dialect() {
            Dialect::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Dialect::Mysql => {
                "SELECT table_name AS name FROM information_schema.tables WHERE table_schema = DATABASE() ORDER BY table_name"
            }
            Dialect::Postgres => {
                "SELECT table_name AS name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name"
            }
            Dialect::Mssql => {
                "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            }
        };
        let rows = self.conn.query(sql)?;
        Ok(rows.iter().filter_map(|row| text(row, "name")).collect())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == table))
    }

    /// Columns of `table` in declaration order. Empty when the table does not
    /// exist.
    pub fn list_columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        Ok(self.describe(table)?.columns)
    }

    /// `PRAGMA table_info` rows paired with their 1-based key position.
    fn sqlite_table_info(&self, table: &str) -> Result<Vec<(ColumnMeta, i64)>> {
        let sql = format!("PRAGMA table_info({})", sanitize_identifier(table));
        let rows = self.conn.query(&sql)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "name")?;
                let sql_type = text(row, "type").unwrap_or_default();
                let notnull = row.get_named::<i64>("notnull").unwrap_or(0);
                let pk = row.get_named::<i64>("pk").unwrap_or(0);
                let meta = ColumnMeta::new(name, sql_type, notnull == 0, text(row, "dflt_value"), pk > 0);
                Some((meta, pk))
            })
            .collect())
    }

    fn sqlite_primary_keys(info: &[(ColumnMeta, i64)]) -> Vec<String> {
        let mut keyed: Vec<(i64, &str)> = info
            .iter()
            .filter(|(_, pk)| *pk > 0)
            .map(|(meta, pk)| (*pk, meta.name()))
            .collect();
        keyed.sort_by_key(|(order, _)| *order);
        keyed.into_iter().map(|(_, name)| name.to_string()).collect()
    }

    fn information_schema_columns(&self, dialect: Dialect, table: &str) -> Result<Vec<ColumnMeta>> {
        let sql = match dialect {
            Dialect::Mysql => {
                "SELECT column_name AS name, column_type AS type, is_nullable AS nullable, \
                 column_default AS dflt FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = :table ORDER BY ordinal_position"
            }
            Dialect::Postgres => {
                "SELECT column_name AS name, data_type AS type, udt_name, \
                 character_maximum_length AS char_len, is_nullable AS nullable, \
                 column_default AS dflt FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = :table ORDER BY ordinal_position"
            }
            Dialect::Mssql | Dialect::Sqlite => {
                "SELECT COLUMN_NAME AS name, DATA_TYPE AS type, \
                 CHARACTER_MAXIMUM_LENGTH AS char_len, IS_NULLABLE AS nullable, \
                 COLUMN_DEFAULT AS dflt FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = :table ORDER BY ORDINAL_POSITION"
            }
        };
        let rows = self.conn.query_with(sql, &table_param(table))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "name")?;
                let data_type = text(row, "type").unwrap_or_default();
                let char_len = row.get_named::<Option<i64>>("char_len").ok().flatten();
                let sql_type = match dialect {
                    Dialect::Mysql => data_type,
                    _ => build_type(&data_type, text(row, "udt_name").as_deref(), char_len),
                };
                Some(ColumnMeta::new(
                    name,
                    sql_type,
                    yes(row, "nullable"),
                    text(row, "dflt"),
                    false,
                ))
            })
            .collect())
    }

    /// Primary-key columns of `table` in key order.
    pub fn list_primary_keys(&self, table: &str) -> Result<Vec<String>> {
        let sql = match self.dialect() {
            Dialect::Sqlite => {
                let info = self.sqlite_table_info(table)?;
                return Ok(Self::sqlite_primary_keys(&info));
            }
            Dialect::Mysql => {
                "SELECT column_name AS name FROM information_schema.key_column_usage \
                 WHERE table_schema = DATABASE() AND table_name = :table \
                 AND constraint_name = 'PRIMARY' ORDER BY ordinal_position"
            }
            Dialect::Postgres => {
                "SELECT kcu.column_name AS name FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                 ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = 'public' \
                 AND tc.table_name = :table ORDER BY kcu.ordinal_position"
            }
            Dialect::Mssql => {
                "SELECT kcu.COLUMN_NAME AS name FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                 ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                 WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND tc.TABLE_NAME = :table \
                 ORDER BY kcu.ORDINAL_POSITION"
            }
        };
        let rows = self.conn.query_with(sql, &table_param(table))?;
        Ok(rows.iter().filter_map(|row| text(row, "name")).collect())
    }

    /// Foreign-key constraints declared on `table`.
    pub fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>> {
        let rows = match self.dialect() {
            Dialect::Sqlite => {
                let sql = format!("PRAGMA foreign_key_list({})", sanitize_identifier(table));
                let rows = self.conn.query(&sql)?;
                return Ok(rows
                    .iter()
                    .filter_map(|row| {
                        Some(ForeignKeyMeta {
                            name: None,
                            column: text(row, "from")?,
                            table: text(row, "table")?,
                            referenced_column: text(row, "to").unwrap_or_else(|| "id".to_string()),
                        })
                    })
                    .collect());
            }
            Dialect::Mysql => self.conn.query_with(
                "SELECT constraint_name AS name, column_name, \
                 referenced_table_name AS ref_table, referenced_column_name AS ref_column \
                 FROM information_schema.key_column_usage \
                 WHERE table_schema = DATABASE() AND table_name = :table \
                 AND referenced_table_name IS NOT NULL",
                &table_param(table),
            )?,
            Dialect::Postgres => self.conn.query_with(
                "SELECT tc.constraint_name AS name, kcu.column_name, \
                 ccu.table_name AS ref_table, ccu.column_name AS ref_column \
                 FROM information_schema.table_constraints AS tc \
                 JOIN information_schema.key_column_usage AS kcu \
                 ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
                 JOIN information_schema.constraint_column_usage AS ccu \
                 ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = :table \
                 AND tc.table_schema = 'public'",
                &table_param(table),
            )?,
            Dialect::Mssql => self.conn.query_with(
                "SELECT fk.name AS name, \
                 COL_NAME(fkc.parent_object_id, fkc.parent_column_id) AS column_name, \
                 OBJECT_NAME(fkc.referenced_object_id) AS ref_table, \
                 COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS ref_column \
                 FROM sys.foreign_keys fk \
                 JOIN sys.foreign_key_columns fkc ON fk.object_id = fkc.constraint_object_id \
                 WHERE OBJECT_NAME(fk.parent_object_id) = :table",
                &table_param(table),
            )?,
        };
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ForeignKeyMeta {
                    name: text(row, "name"),
                    column: text(row, "column_name")?,
                    table: text(row, "ref_table")?,
                    referenced_column: text(row, "ref_column")?,
                })
            })
            .collect())
    }

    /// Columns, keys and constraints of `table` in one value.
    pub fn describe(&self, table: &str) -> Result<TableShape> {
        let (mut columns, primary_keys) = match self.dialect() {
            Dialect::Sqlite => {
                let info = self.sqlite_table_info(table)?;
                let pks = Self::sqlite_primary_keys(&info);
                (info.into_iter().map(|(meta, _)| meta).collect::<Vec<_>>(), pks)
            }
            dialect => {
                let mut columns = self.information_schema_columns(dialect, table)?;
                let pks = self.list_primary_keys(table)?;
                for column in &mut columns {
                    column.primary_key = pks.contains(&column.name);
                }
                (columns, pks)
            }
        };
        let foreign_keys = self.list_foreign_keys(table)?;
        for column in &mut columns {
            if let Some(fk) = foreign_keys.iter().find(|fk| fk.column == column.name) {
                column.foreign_key = Some((fk.table.clone(), fk.referenced_column.clone()));
            }
        }
        tracing::debug!(
            table = %table,
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "Reflected table"
        );
        Ok(TableShape {
            name: table.to_string(),
            columns,
            primary_keys,
            foreign_keys,
        })
    }
}

/// Rebuild a full type string from `information_schema` parts.
fn build_type(data_type: &str, udt_name: Option<&str>, char_len: Option<i64>) -> String {
    let upper = data_type.to_uppercase();
    if upper == "ARRAY" {
        if let Some(udt) = udt_name {
            return format!("{}[]", udt.trim_start_matches('_').to_uppercase());
        }
    }
    let base = match upper.as_str() {
        "CHARACTER VARYING" => "VARCHAR",
        "CHARACTER" => "CHAR",
        other => other,
    };
    match char_len {
        Some(len) if len > 0 => format!("{}({})", base, len),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlrecord_core::Value;

    #[test]
    fn test_build_type() {
        assert_eq!(build_type("character varying", None, Some(255)), "VARCHAR(255)");
        assert_eq!(build_type("integer", None, None), "INTEGER");
        assert_eq!(build_type("ARRAY", Some("_int4"), None), "INT4[]");
        assert_eq!(build_type("nvarchar", None, Some(-1)), "NVARCHAR");
    }

    #[test]
    fn test_constraint_name() {
        let fk = ForeignKeyMeta::new("author_id", "author");
        assert_eq!(fk.constraint_name("post"), "fk_post_author_id_author");
        let named = ForeignKeyMeta {
            name: Some("custom".to_string()),
            ..fk
        };
        assert_eq!(named.constraint_name("post"), "custom");
    }

    #[test]
    fn test_table_shape_lookup() {
        let shape = TableShape {
            name: "t".to_string(),
            columns: vec![
                ColumnMeta::new("id", "INTEGER", false, None, true),
                ColumnMeta::new("name", "TEXT", true, Some("'x'".to_string()), false),
            ],
            primary_keys: vec!["id".to_string()],
            foreign_keys: Vec::new(),
        };
        assert_eq!(shape.column_names(), vec!["id", "name"]);
        let name = shape.column("name").unwrap();
        assert!(name.nullable());
        assert_eq!(name.default(), Some("'x'"));
        assert!(shape.column("missing").is_none());
    }

    fn recorded(dialect: Dialect) -> (Connection, sqlrecord_core::testing::RecordingDriver) {
        let driver = sqlrecord_core::testing::RecordingDriver::new(dialect);
        let conn = Connection::with_driver(
            sqlrecord_core::ConnectionParams::new(dialect),
            Box::new(driver.clone()),
        );
        (conn, driver)
    }

    fn table_info(name: &str, ty: &str, notnull: i64, pk: i64) -> Row {
        Row::new(
            ["cid", "name", "type", "notnull", "dflt_value", "pk"]
                .map(String::from)
                .to_vec(),
            vec![
                Value::Int(0),
                name.into(),
                ty.into(),
                Value::Int(notnull),
                Value::Null,
                Value::Int(pk),
            ],
        )
    }

    #[test]
    fn test_describe_sqlite() {
        let (conn, driver) = recorded(Dialect::Sqlite);
        driver.push_rows(vec![
            table_info("tag_id", "INTEGER", 1, 2),
            table_info("post_id", "INTEGER", 1, 1),
            table_info("note", "TEXT", 0, 0),
        ]);
        driver.push_rows(vec![Row::new(
            ["id", "seq", "table", "from", "to"].map(String::from).to_vec(),
            vec![
                Value::Int(0),
                Value::Int(0),
                "post".into(),
                "post_id".into(),
                "id".into(),
            ],
        )]);

        let shape = Introspector::new(&conn).describe("post_tag").unwrap();
        assert_eq!(shape.primary_keys, vec!["post_id", "tag_id"]);
        assert_eq!(shape.column_names(), vec!["tag_id", "post_id", "note"]);
        let post_id = shape.column("post_id").unwrap();
        assert!(post_id.primary_key());
        assert!(!post_id.nullable());
        assert_eq!(post_id.foreign_key(), Some(("post", "id")));
        assert_eq!(shape.foreign_keys, vec![ForeignKeyMeta::new("post_id", "post")]);
        assert_eq!(
            driver.sql(),
            vec!["PRAGMA table_info(post_tag)", "PRAGMA foreign_key_list(post_tag)"]
        );
    }

    #[test]
    fn test_mysql_queries_bind_table_name() {
        let (conn, driver) = recorded(Dialect::Mysql);
        driver.push_rows(vec![Row::new(vec!["name".into()], vec!["post".into()])]);
        assert!(Introspector::new(&conn).table_exists("post").unwrap());

        driver.clear();
        Introspector::new(&conn).list_foreign_keys("post").unwrap();
        let statements = driver.statements();
        assert!(statements[0].sql.contains("referenced_table_name IS NOT NULL"));
        assert_eq!(statements[0].params.get("table"), Some(&Value::from("post")));
    }
}
