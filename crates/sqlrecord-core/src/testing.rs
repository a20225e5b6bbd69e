//! A scripted driver for exercising SQL generation without a database.

use crate::dialect::Dialect;
use crate::driver::Driver;
use crate::error::Result;
use crate::params::Params;
use crate::row::Row;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A statement seen by a [`RecordingDriver`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub sql: String,
    pub params: Params,
}

#[derive(Debug, Default)]
struct Script {
    statements: Vec<Recorded>,
    responses: VecDeque<Vec<Row>>,
    next_id: i64,
}

/// Records every statement and answers queries from a queue of scripted
/// result sets. Inserts hand out sequential identities starting at 1.
///
/// Clones share the same script, so a test keeps one handle while the
/// connection owns another.
#[derive(Debug, Clone)]
pub struct RecordingDriver {
    dialect: Dialect,
    script: Arc<Mutex<Script>>,
}

impl RecordingDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the rows returned by the next query.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.script().responses.push_back(rows);
    }

    pub fn statements(&self) -> Vec<Recorded> {
        self.script().statements.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.script()
            .statements
            .iter()
            .map(|r| r.sql.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.script().statements.clear();
    }
}

impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let mut script = self.script();
        script.statements.push(Recorded {
            sql: sql.to_string(),
            params: params.clone(),
        });
        Ok(script.responses.pop_front().unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<u64> {
        let mut script = self.script();
        script.statements.push(Recorded {
            sql: sql.to_string(),
            params: params.clone(),
        });
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            script.next_id += 1;
        }
        Ok(1)
    }

    fn last_insert_id(&mut self) -> Result<Option<i64>> {
        let id = self.script().next_id;
        Ok((id > 0).then_some(id))
    }
}
