//! Statement builders for INSERT, UPDATE and DELETE.
//!
//! Every literal is bound through [`Params`]. Key columns are bound under
//! their own name (`WHERE id = :id`), data columns under numbered
//! placeholders.

use sqlrecord_core::{Dialect, Params, Value};

/// INSERT statement builder.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    values: Vec<(String, Value)>,
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.values
            .extend(values.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Build the INSERT SQL and parameters.
    ///
    /// An insert without values uses the dialect's all-defaults form.
    pub fn build(&self, dialect: Dialect) -> (String, Params) {
        let mut params = Params::new();
        if self.values.is_empty() {
            let sql = match dialect {
                Dialect::Mysql => format!("INSERT INTO {} () VALUES ()", self.table),
                _ => format!("INSERT INTO {} DEFAULT VALUES", self.table),
            };
            return (sql, params);
        }
        let columns: Vec<&str> = self.values.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders: Vec<String> = self
            .values
            .iter()
            .map(|(_, v)| params.bind(v.clone()))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        (sql, params)
    }
}

/// UPDATE statement builder.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, Value)>,
    conditions: Vec<String>,
    params: Params,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            conditions: Vec::new(),
            params: Params::new(),
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((column.into(), value.into()));
        self
    }

    /// Match `column` against `value`, bound as `:column`.
    #[must_use]
    pub fn key(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.params.insert(column, value);
        self.conditions.push(format!("{} = :{}", column, column));
        self
    }

    /// Restrict by an already rendered condition and its parameters.
    #[must_use]
    pub fn scope(mut self, condition: impl Into<String>, params: Params) -> Self {
        self.conditions.push(condition.into());
        self.params = params;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Build the UPDATE SQL and parameters.
    pub fn build(&self) -> (String, Params) {
        let mut params = self.params.clone();
        let sets: Vec<String> = self
            .sets
            .iter()
            .map(|(c, v)| format!("{} = {}", c, params.bind(v.clone())))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        (sql, params)
    }
}

/// DELETE statement builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    conditions: Vec<String>,
    params: Params,
}

impl DeleteBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            params: Params::new(),
        }
    }

    /// Match `column` against `value`, bound as `:column`.
    #[must_use]
    pub fn key(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.params.insert(column, value);
        self.conditions.push(format!("{} = :{}", column, column));
        self
    }

    /// Restrict by an already rendered condition and its parameters.
    #[must_use]
    pub fn scope(mut self, condition: impl Into<String>, params: Params) -> Self {
        self.conditions.push(condition.into());
        self.params = params;
        self
    }

    /// Build the DELETE SQL and parameters.
    pub fn build(&self) -> (String, Params) {
        let mut sql = format!("DELETE FROM {}", self.table);
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        (sql, self.params.clone())
    }
}
