//! Column type guessing from naming conventions.

use sqlrecord_core::Dialect;

/// A column type derived from the column's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessedType {
    pub sql_type: String,
    /// Only set for the conventional `id` column.
    pub auto_increment: bool,
}

impl GuessedType {
    fn plain(sql_type: &str) -> Self {
        Self {
            sql_type: sql_type.to_string(),
            auto_increment: false,
        }
    }
}

/// Guess a column type from its name.
///
/// Rules, first match wins:
///
/// | Name | Type |
/// |------|------|
/// | `id` | auto-increment integer |
/// | `*_id` | integer |
/// | `*_at` | date-time |
/// | `is_*`, `has_*` | boolean |
/// | `*_price` | `DECIMAL(10,2)` |
/// | anything else | string |
pub fn guess_type(column: &str, dialect: Dialect) -> GuessedType {
    let name = column.to_ascii_lowercase();
    if name == "id" {
        return GuessedType {
            sql_type: integer(dialect).to_string(),
            auto_increment: true,
        };
    }
    if name.ends_with("_id") {
        return GuessedType::plain(integer(dialect));
    }
    if name.ends_with("_at") {
        return GuessedType::plain(match dialect {
            Dialect::Postgres => "TIMESTAMP",
            _ => "DATETIME",
        });
    }
    if name.starts_with("is_") || name.starts_with("has_") {
        return GuessedType::plain(match dialect {
            Dialect::Mysql => "TINYINT(1)",
            Dialect::Mssql => "BIT",
            Dialect::Sqlite | Dialect::Postgres => "BOOLEAN",
        });
    }
    if name.ends_with("_price") {
        return GuessedType::plain("DECIMAL(10,2)");
    }
    GuessedType::plain(match dialect {
        Dialect::Sqlite => "TEXT",
        Dialect::Mssql => "NVARCHAR(255)",
        Dialect::Mysql | Dialect::Postgres => "VARCHAR(255)",
    })
}

fn integer(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "INTEGER",
        _ => "INT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_auto_increment() {
        let guess = guess_type("id", Dialect::Mysql);
        assert!(guess.auto_increment);
        assert_eq!(guess.sql_type, "INT");
        assert_eq!(guess_type("ID", Dialect::Sqlite).sql_type, "INTEGER");
    }

    #[test]
    fn test_suffix_and_prefix_rules() {
        let d = Dialect::Mysql;
        assert_eq!(guess_type("author_id", d), GuessedType::plain("INT"));
        assert_eq!(guess_type("created_at", d).sql_type, "DATETIME");
        assert_eq!(guess_type("created_at", Dialect::Postgres).sql_type, "TIMESTAMP");
        assert_eq!(guess_type("is_active", d).sql_type, "TINYINT(1)");
        assert_eq!(guess_type("has_children", Dialect::Mssql).sql_type, "BIT");
        assert_eq!(guess_type("unit_price", d).sql_type, "DECIMAL(10,2)");
    }

    #[test]
    fn test_default_is_string() {
        assert_eq!(guess_type("name", Dialect::Mysql).sql_type, "VARCHAR(255)");
        assert_eq!(guess_type("name", Dialect::Sqlite).sql_type, "TEXT");
        assert_eq!(guess_type("name", Dialect::Mssql).sql_type, "NVARCHAR(255)");
        assert!(!guess_type("identity", Dialect::Mysql).auto_increment);
    }
}
