//! Connection parameters and DSN parsing.
//!
//! A connection is described either by a driver-qualified string
//! (`mysql:host=localhost;dbname=app`, `sqlite:/path/to/file`,
//! `sqlite::memory:`) or by a key/value map. Both normalize to the same
//! [`ConnectionParams`].

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Path used for SQLite in-memory databases.
pub const MEMORY_PATH: &str = ":memory:";

/// Normalized connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ConnectionParams {
    pub dialect: Dialect,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database file for SQLite (`:memory:` for an in-memory database)
    pub path: Option<String>,
    pub charset: Option<String>,
    /// Driver-specific keys passed through untouched
    pub extra: BTreeMap<String, String>,
}

/// Map a user-facing key onto its canonical name.
fn normalize_key(key: &str) -> String {
    let key = key.trim().to_ascii_lowercase();
    match key.as_str() {
        "database" => "dbname".to_string(),
        "driver" => "dbtype".to_string(),
        "username" => "user".to_string(),
        _ => key,
    }
}

impl ConnectionParams {
    /// Empty parameters for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            host: None,
            port: None,
            dbname: None,
            user: None,
            password: None,
            path: None,
            charset: None,
            extra: BTreeMap::new(),
        }
    }

    /// In-memory SQLite parameters.
    pub fn sqlite_memory() -> Self {
        let mut params = Self::new(Dialect::Sqlite);
        params.path = Some(MEMORY_PATH.to_string());
        params
    }

    /// Parse a driver-qualified connection string.
    pub fn parse(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        let (driver, rest) = dsn
            .split_once(':')
            .ok_or_else(|| Error::config(format!("DSN '{}' has no driver prefix", dsn)))?;
        let dialect = Dialect::parse(driver)?;
        let mut params = Self::new(dialect);

        if dialect == Dialect::Sqlite && !looks_like_pairs(rest) {
            params.path = Some(if rest.is_empty() {
                MEMORY_PATH.to_string()
            } else {
                rest.to_string()
            });
            return Ok(params);
        }

        for pair in rest.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::config(format!("DSN segment '{}' is not key=value", pair))
            })?;
            params.set(&normalize_key(key), value.trim())?;
        }
        params.apply_defaults();
        Ok(params)
    }

    /// Build parameters from a structured key/value map.
    ///
    /// A `dsn` key is parsed first; remaining keys override it. Otherwise the
    /// `dbtype` (alias `driver`) key selects the dialect.
    pub fn from_map<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let normalized: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.as_ref().to_string()))
            .collect();

        let mut params = if let Some(dsn) = normalized.get("dsn") {
            Self::parse(dsn)?
        } else {
            let driver = normalized
                .get("dbtype")
                .ok_or_else(|| Error::config("connection parameters need 'dbtype' or 'dsn'"))?;
            Self::new(Dialect::parse(driver)?)
        };

        for (key, value) in &normalized {
            if key != "dsn" && key != "dbtype" {
                params.set(key, value)?;
            }
        }
        params.apply_defaults();
        Ok(params)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        match key {
            "host" => self.host = Some(value),
            "port" => {
                self.port = Some(
                    value
                        .parse()
                        .map_err(|_| Error::config(format!("invalid port '{}'", value)))?,
                );
            }
            "dbname" => self.dbname = Some(value),
            "user" => self.user = Some(value),
            "password" => self.password = Some(value),
            "path" => self.path = Some(value),
            "charset" => self.charset = Some(value),
            "dbtype" => self.dialect = Dialect::parse(&value)?,
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    fn apply_defaults(&mut self) {
        match self.dialect {
            Dialect::Mysql if self.host.is_none() => {
                self.host = Some("localhost".to_string());
            }
            Dialect::Sqlite if self.path.is_none() => {
                self.path = Some(
                    self.dbname
                        .clone()
                        .unwrap_or_else(|| MEMORY_PATH.to_string()),
                );
            }
            _ => {}
        }
    }

    /// Whether this describes an in-memory SQLite database.
    pub fn is_memory(&self) -> bool {
        self.dialect == Dialect::Sqlite && self.path.as_deref() == Some(MEMORY_PATH)
    }

    /// Render the normalized driver-qualified form. Credentials are omitted.
    pub fn to_dsn(&self) -> String {
        if self.dialect == Dialect::Sqlite {
            return format!(
                "sqlite:{}",
                self.path.as_deref().unwrap_or(MEMORY_PATH)
            );
        }
        let mut parts = Vec::new();
        if let Some(host) = &self.host {
            parts.push(format!("host={}", host));
        }
        if let Some(port) = self.port {
            parts.push(format!("port={}", port));
        }
        if let Some(dbname) = &self.dbname {
            parts.push(format!("dbname={}", dbname));
        }
        if let Some(charset) = &self.charset {
            parts.push(format!("charset={}", charset));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{}={}", key, value));
        }
        format!("{}:{}", self.dialect.as_str(), parts.join(";"))
    }
}

fn looks_like_pairs(rest: &str) -> bool {
    rest.split(';')
        .next()
        .and_then(|first| first.split_once('='))
        .is_some_and(|(key, _)| {
            matches!(normalize_key(key).as_str(), "dbname" | "path" | "dbtype")
        })
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dsn())
    }
}

impl TryFrom<BTreeMap<String, String>> for ConnectionParams {
    type Error = Error;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        Self::from_map(map)
    }
}

impl From<ConnectionParams> for BTreeMap<String, String> {
    fn from(params: ConnectionParams) -> Self {
        let mut map = params.extra;
        map.insert("dbtype".to_string(), params.dialect.as_str().to_string());
        let optional = [
            ("host", params.host),
            ("port", params.port.map(|p| p.to_string())),
            ("dbname", params.dbname),
            ("user", params.user),
            ("password", params.password),
            ("path", params.path),
            ("charset", params.charset),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mysql_defaults_host() {
        let params = ConnectionParams::parse("mysql:dbname=app;charset=utf8mb4").unwrap();
        assert_eq!(params.dialect, Dialect::Mysql);
        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.dbname.as_deref(), Some("app"));
        assert_eq!(params.charset.as_deref(), Some("utf8mb4"));
    }

    #[test]
    fn test_parse_aliases() {
        let params =
            ConnectionParams::parse("pgsql:host=db;port=5433;database=shop;username=web").unwrap();
        assert_eq!(params.dialect, Dialect::Postgres);
        assert_eq!(params.port, Some(5433));
        assert_eq!(params.dbname.as_deref(), Some("shop"));
        assert_eq!(params.user.as_deref(), Some("web"));
    }

    #[test]
    fn test_parse_sqlite_paths() {
        let memory = ConnectionParams::parse("sqlite::memory:").unwrap();
        assert!(memory.is_memory());

        let file = ConnectionParams::parse("sqlite:/var/data/app.db").unwrap();
        assert_eq!(file.path.as_deref(), Some("/var/data/app.db"));
        assert_eq!(file.to_dsn(), "sqlite:/var/data/app.db");
    }

    #[test]
    fn test_from_map_normalizes_aliases() {
        let params = ConnectionParams::from_map([
            ("driver", "mysql"),
            ("database", "app"),
            ("username", "root"),
            ("password", "secret"),
        ])
        .unwrap();
        assert_eq!(params.dialect, Dialect::Mysql);
        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.user.as_deref(), Some("root"));
        assert_eq!(params.to_dsn(), "mysql:host=localhost;dbname=app");
    }

    #[test]
    fn test_map_and_string_forms_agree() {
        let from_map = ConnectionParams::from_map([("driver", "sqlite"), ("database", ":memory:")])
            .unwrap();
        let from_dsn = ConnectionParams::parse("sqlite::memory:").unwrap();
        assert_eq!(from_map.path, from_dsn.path);
        assert_eq!(from_map.to_dsn(), from_dsn.to_dsn());
    }

    #[test]
    fn test_from_map_with_dsn_key() {
        let params =
            ConnectionParams::from_map([("dsn", "mysql:host=db;dbname=app"), ("user", "app")])
                .unwrap();
        assert_eq!(params.host.as_deref(), Some("db"));
        assert_eq!(params.user.as_deref(), Some("app"));
    }

    #[test]
    fn test_deserialize_from_json() {
        let params: ConnectionParams = serde_json::from_str(
            r#"{"driver": "mysql", "database": "blog", "username": "web", "port": "3307"}"#,
        )
        .unwrap();
        assert_eq!(params.dbname.as_deref(), Some("blog"));
        assert_eq!(params.port, Some(3307));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(ConnectionParams::parse("no-driver-here").is_err());
        assert!(ConnectionParams::parse("mysql:port=abc").is_err());
        assert!(ConnectionParams::parse("mysql:hostlocalhost").is_err());
        assert!(ConnectionParams::from_map([("host", "x")]).is_err());
    }
}
