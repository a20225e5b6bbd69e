//! Native driver seams.
//!
//! A [`Driver`] is one open native database handle. A [`Connector`] opens
//! drivers from [`ConnectionParams`]; a [`Connection`](crate::Connection)
//! holds a connector and calls it on first use.

use crate::dialect::Dialect;
use crate::dsn::ConnectionParams;
use crate::error::{ConnectionError, ConnectionErrorKind, Error, Result};
use crate::params::Params;
use crate::row::Row;

/// An open native database handle.
///
/// Implementations bind parameters natively; SQL text is never assembled
/// from parameter values.
pub trait Driver: Send {
    /// Dialect spoken by this handle.
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &Params) -> Result<u64>;

    /// Identity generated by the most recent insert, if the handle tracks one.
    fn last_insert_id(&mut self) -> Result<Option<i64>>;

    /// Quote a string literal using the driver's native rules.
    fn quote_str(&self, s: &str) -> String {
        standard_quote(s)
    }
}

/// Opens native handles.
pub trait Connector: Send + Sync {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Driver>>;
}

impl<F> Connector for F
where
    F: Fn(&ConnectionParams) -> Result<Box<dyn Driver>> + Send + Sync,
{
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Driver>> {
        self(params)
    }
}

/// A connector that refuses to connect.
///
/// Useful for connections that only generate SQL text, such as DDL previews
/// for a dialect without a linked driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConnector;

impl Connector for NoConnector {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Driver>> {
        Err(Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::NoDriver,
            message: format!("no driver available for '{}'", params.dialect),
            source: None,
        }))
    }
}

/// SQL-standard string quoting: wrap in single quotes, double embedded ones.
pub fn standard_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
