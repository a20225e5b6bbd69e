//! MySQL DDL generator.
//!
//! MySQL alters columns and constraints in place.

use super::DdlGenerator;
use crate::introspect::ForeignKeyMeta;
use sqlrecord_core::Dialect;

/// DDL generator for MySQL.
pub struct MysqlDdlGenerator;

impl DdlGenerator for MysqlDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn auto_increment_column(&self, name: &str) -> String {
        format!("{} INT AUTO_INCREMENT", name)
    }

    fn drop_foreign_key(&self, table: &str, fk: &ForeignKeyMeta) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            table,
            fk.constraint_name(table)
        )
    }
}
