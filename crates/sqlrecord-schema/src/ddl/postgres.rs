//! PostgreSQL DDL generator.

use super::DdlGenerator;
use sqlrecord_core::Dialect;

/// DDL generator for PostgreSQL.
pub struct PostgresDdlGenerator;

impl DdlGenerator for PostgresDdlGenerator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn auto_increment_column(&self, name: &str) -> String {
        format!("{} SERIAL", name)
    }
}
