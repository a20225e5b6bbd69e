//! Registering record types against the live schema and creating their
//! tables.

use crate::mapper::Mapper;
use sqlrecord_core::{
    Error, RecordType, RecordTypeBuilder, RelationKind, Result, SchemaErrorKind,
};
use sqlrecord_schema::{
    DdlMode, FieldDef, ForeignKeyMeta, Introspector, Migrator, TableDefinition, guess_type,
};
use std::sync::Arc;

impl Mapper<'_> {
    /// Register a record type, filling in column types.
    ///
    /// When the table exists, its reflected columns and types are adopted for
    /// every column the declaration leaves untyped. Declared columns the table
    /// lacks get a type guessed from their name.
    #[tracing::instrument(level = "debug", skip(self, builder), fields(table = builder.table()))]
    pub fn register_with_schema(&self, builder: RecordTypeBuilder) -> Result<Arc<RecordType>> {
        let table = builder.table().to_string();
        let introspector = Introspector::new(self.conn);
        let reflected = if introspector.table_exists(&table)? {
            introspector.list_columns(&table)?
        } else {
            Vec::new()
        };

        let mut builder = builder;
        for column in &reflected {
            if builder.declared_type(column.name()).is_none() && !column.sql_type().is_empty() {
                builder = builder.column_type(column.name(), column.sql_type());
            }
        }

        let dialect = self.conn.dialect();
        let missing: Vec<String> = builder
            .declared_columns()
            .iter()
            .filter(|c| builder.declared_type(c).is_none())
            .filter(|c| !reflected.iter().any(|r| r.name() == c.as_str()))
            .cloned()
            .collect();
        for column in missing {
            let guessed = guess_type(&column, dialect);
            // The DDL generator picks the identity column type itself.
            if !guessed.auto_increment {
                builder = builder.column_type(column, guessed.sql_type);
            }
        }

        tracing::debug!(
            table = %table,
            reflected = reflected.len(),
            "Registering record type with schema"
        );
        Ok(self.types.register(builder.build()))
    }

    /// The table definition implied by a registered type.
    pub fn table_definition(&self, table: &str) -> Result<TableDefinition> {
        let ty = self.types.require(table)?;
        if !ty.has_declared_columns() {
            return Err(Error::schema(
                SchemaErrorKind::Invalid,
                format!("record type '{}' declares no columns", table),
            ));
        }

        let mut def = TableDefinition::new(ty.table());
        for column in ty.columns() {
            def = def.field(match ty.declared_type(column) {
                Some(sql_type) => FieldDef::typed(column.as_str(), sql_type),
                None => FieldDef::new(column.as_str()),
            });
        }
        def = def.primary_key(ty.primary_key().iter().cloned());
        for rel in ty.relations() {
            if rel.kind != RelationKind::OneToOne {
                continue;
            }
            let referenced = self
                .types
                .get(&rel.target)
                .and_then(|target| target.single_primary_key().ok().map(str::to_string))
                .unwrap_or_else(|| "id".to_string());
            def = def.foreign_key(
                ForeignKeyMeta::new(rel.foreign_key.as_str(), rel.target.as_str())
                    .references(referenced),
            );
        }
        Ok(def)
    }

    /// Create the table of a registered type.
    ///
    /// Returns the DDL; `mode` decides whether it also runs.
    pub fn create_table_for(&self, table: &str, mode: DdlMode) -> Result<Vec<String>> {
        let def = self.table_definition(table)?;
        Migrator::new(self.conn).mode(mode).create_table(&def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlrecord_core::testing::RecordingDriver;
    use sqlrecord_core::{Connection, ConnectionParams, Dialect, Row, TypeRegistry, Value};

    fn mysql() -> (Connection, RecordingDriver, TypeRegistry) {
        let driver = RecordingDriver::new(Dialect::Mysql);
        let conn = Connection::with_driver(
            ConnectionParams::new(Dialect::Mysql),
            Box::new(driver.clone()),
        );
        (conn, driver, TypeRegistry::new())
    }

    #[test]
    fn test_register_guesses_types_for_new_table() {
        let (conn, driver, types) = mysql();
        driver.push_rows(Vec::new());
        let ty = Mapper::new(&conn, &types)
            .register_with_schema(
                RecordType::builder("post")
                    .columns(["title", "published_at", "is_draft"])
                    .column_type("body", "TEXT"),
            )
            .unwrap();
        assert_eq!(ty.declared_type("title"), Some("VARCHAR(255)"));
        assert_eq!(ty.declared_type("published_at"), Some("DATETIME"));
        assert_eq!(ty.declared_type("is_draft"), Some("TINYINT(1)"));
        assert_eq!(ty.declared_type("body"), Some("TEXT"));
        assert_eq!(ty.declared_type("id"), None);
        assert!(types.get("post").is_some());
    }

    #[test]
    fn test_register_adopts_reflected_types() {
        let (conn, driver, types) = mysql();
        driver.push_rows(vec![Row::new(vec!["name".into()], vec!["author".into()])]);
        let column = |name: &str, ty: &str| {
            Row::new(
                vec!["name".into(), "type".into(), "nullable".into(), "dflt".into()],
                vec![name.into(), ty.into(), "YES".into(), Value::Null],
            )
        };
        driver.push_rows(vec![column("id", "int"), column("name", "varchar(80)")]);
        driver.push_rows(vec![Row::new(vec!["name".into()], vec!["id".into()])]);
        driver.push_rows(Vec::new());

        let ty = Mapper::new(&conn, &types)
            .register_with_schema(RecordType::builder("author"))
            .unwrap();
        assert_eq!(ty.columns(), ["id".to_string(), "name".to_string()]);
        assert_eq!(ty.declared_type("name"), Some("varchar(80)"));
    }

    #[test]
    fn test_create_table_for() {
        let (conn, driver, types) = mysql();
        types.register(RecordType::builder("author").columns(["name"]).build());
        types.register(
            RecordType::builder("post")
                .column_type("title", "VARCHAR(120)")
                .has_one("author")
                .build(),
        );
        let mapper = Mapper::new(&conn, &types);
        let ddl = mapper.create_table_for("post", DdlMode::Preview).unwrap();
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS post ("));
        assert!(ddl[0].contains("id INT AUTO_INCREMENT"));
        assert!(ddl[0].contains("title VARCHAR(120)"));
        assert!(ddl[0].contains("FOREIGN KEY (author_id) REFERENCES author(id)"));
        assert!(driver.statements().is_empty());

        types.register(RecordType::bare("loose"));
        let err = mapper.create_table_for("loose", DdlMode::Preview).unwrap_err();
        assert!(matches!(err, Error::Schema(ref e) if e.kind == SchemaErrorKind::Invalid));
    }
}
