//! Identifier validation for generated DDL.
//!
//! DDL identifiers are emitted unquoted, so every table and column name must be
//! a plain identifier that is not a reserved word of the target dialect.

use regex::Regex;
use sqlrecord_core::{Dialect, Error, Result, SchemaErrorKind};
use std::sync::LazyLock;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Reserved in every supported dialect.
const COMMON: &[&str] = &[
    "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
    "commit", "constraint", "create", "cross", "current_date", "current_time",
    "current_timestamp", "default", "delete", "desc", "distinct", "drop", "else", "end",
    "exists", "foreign", "from", "full", "grant", "group", "having", "in", "index", "inner",
    "insert", "intersect", "into", "is", "join", "left", "like", "natural", "not", "null", "on",
    "or", "order", "outer", "primary", "references", "right", "rollback", "select", "set",
    "table", "then", "to", "union", "unique", "update", "using", "values", "when", "where",
    "with",
];

const MYSQL: &[&str] = &[
    "database", "databases", "div", "interval", "key", "keys", "limit", "lines", "load", "lock",
    "long", "match", "mod", "option", "range", "read", "regexp", "rlike", "schema", "show",
    "use", "write", "xor",
];

const POSTGRES: &[&str] = &[
    "analyse", "analyze", "array", "current_user", "do", "fetch", "lateral", "limit", "offset",
    "only", "placing", "returning", "session_user", "symmetric", "user", "variadic", "window",
];

const MSSQL: &[&str] = &[
    "database", "fetch", "file", "identity", "key", "open", "percent", "pivot", "plan",
    "print", "proc", "procedure", "rule", "save", "schema", "top", "tran", "transaction",
    "unpivot", "user", "view",
];

const SQLITE: &[&str] = &[
    "abort", "autoincrement", "glob", "indexed", "isnull", "limit", "notnull", "offset",
    "pragma", "raise", "regexp", "temp", "temporary", "vacuum",
];

/// Whether `name` is a reserved word in `dialect`, ignoring case.
pub fn is_reserved(name: &str, dialect: Dialect) -> bool {
    let lower = name.to_ascii_lowercase();
    let extra = match dialect {
        Dialect::Mysql => MYSQL,
        Dialect::Postgres => POSTGRES,
        Dialect::Mssql => MSSQL,
        Dialect::Sqlite => SQLITE,
    };
    COMMON.contains(&lower.as_str()) || extra.contains(&lower.as_str())
}

/// Reject names that cannot be emitted bare in `dialect`.
pub fn check_identifier(name: &str, dialect: Dialect) -> Result<()> {
    if !IDENTIFIER_RE.is_match(name) {
        return Err(Error::schema(
            SchemaErrorKind::InvalidIdentifier,
            format!("'{}' is not a valid identifier", name),
        ));
    }
    if is_reserved(name, dialect) {
        return Err(Error::schema(
            SchemaErrorKind::ReservedName,
            format!("'{}' is a reserved word in {}", name, dialect),
        ));
    }
    Ok(())
}
