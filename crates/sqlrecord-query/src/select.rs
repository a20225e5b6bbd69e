//! The fluent SELECT builder.
//!
//! A [`Query`] accumulates clauses, binds every literal through numbered
//! placeholders and runs on first access to its results. Results are cached on
//! the builder; any later mutation drops the cache.
//!
//! Dotted references to tables that are neither the base table nor joined are
//! joined automatically:
//!
//! ```ignore
//! let posts = Query::table(&conn, "post")
//!     .filter("author.name", "Jane")?
//!     .fetch_all()?;
//! // SELECT post.*, author.name AS author_name FROM post
//! //   LEFT JOIN author ON post.author_id = author.id WHERE (author.name = :p0)
//! ```

use crate::builder::{DeleteBuilder, UpdateBuilder};
use crate::clause::{Operator, OrderBy, render_condition};
use crate::eager;
use crate::join::{Join, JoinKind, apply_aliases, table_refs};
use sqlrecord_core::{
    Connection, Dialect, Error, Params, Record, RecordErrorKind, RecordType, RelationKind, Result,
    Row, TypeRegistry, UsageErrorKind, Value, foreign_key_for,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Where,
    Having,
}

/// A SELECT under construction, bound to one connection.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    conn: &'a Connection,
    types: Option<&'a TypeRegistry>,
    table: Option<String>,
    alias: Option<String>,
    /// table -> alias
    aliases: BTreeMap<String, String>,
    fields: Vec<String>,
    auto_fields: Vec<String>,
    auto_joined: BTreeSet<String>,
    wheres: Vec<String>,
    havings: Vec<String>,
    joins: Vec<Join>,
    group_by: Vec<String>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: Params,
    target: Option<Arc<RecordType>>,
    results: Option<Vec<Record>>,
}

fn no_base_table(what: &str) -> Error {
    Error::usage(
        UsageErrorKind::NoBaseTable,
        format!("{} before a base table was set with from()", what),
    )
}

impl<'a> Query<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            types: None,
            table: None,
            alias: None,
            aliases: BTreeMap::new(),
            fields: Vec::new(),
            auto_fields: Vec::new(),
            auto_joined: BTreeSet::new(),
            wheres: Vec::new(),
            havings: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            params: Params::new(),
            target: None,
            results: None,
        }
    }

    /// Shorthand for `Query::new(conn).from(table)`.
    pub fn table(conn: &'a Connection, table: &str) -> Self {
        Self::new(conn).from(table)
    }

    /// Resolve record types and relation-aware join predicates through
    /// `types`.
    #[must_use]
    pub fn with_types(mut self, types: &'a TypeRegistry) -> Self {
        self.types = Some(types);
        self.results = None;
        self
    }

    #[must_use]
    pub fn from(mut self, table: &str) -> Self {
        if let Some(old) = self.table.take() {
            self.aliases.remove(&old);
        }
        self.table = Some(table.to_string());
        self.alias = None;
        self.results = None;
        self
    }

    #[must_use]
    pub fn from_as(mut self, table: &str, alias: &str) -> Self {
        self = self.from(table);
        self.alias = Some(alias.to_string());
        self.aliases.insert(table.to_string(), alias.to_string());
        self
    }

    /// Map rows onto `ty` instead of the base table's registered type.
    #[must_use]
    pub fn target(mut self, ty: Arc<RecordType>) -> Self {
        self.target = Some(ty);
        self.results = None;
        self
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub fn base_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// The name the base table goes by in the query.
    fn base_ref(&self) -> Option<&str> {
        self.alias.as_deref().or(self.table.as_deref())
    }

    fn is_known(&self, name: &str) -> bool {
        self.table.as_deref() == Some(name)
            || self.alias.as_deref() == Some(name)
            || self.joins.iter().any(|j| j.table == name || j.reference() == name)
    }

    fn base_type(&self) -> Option<Arc<RecordType>> {
        if let Some(ty) = &self.target {
            return Some(Arc::clone(ty));
        }
        let table = self.table.as_deref()?;
        self.types.and_then(|types| types.get(table))
    }

    fn key_of(&self, table: &str) -> String {
        self.types
            .and_then(|types| types.get(table))
            .and_then(|ty| ty.single_primary_key().ok().map(str::to_string))
            .unwrap_or_else(|| "id".to_string())
    }

    /// ON predicate for joining `table` (known in the query as `reference`).
    ///
    /// A declared one-to-one or one-to-many relation from the base type to
    /// `table` supplies the key columns; otherwise `<base>.<table>_id =
    /// <table>.id`.
    fn default_predicate(&self, table: &str, reference: &str) -> Result<String> {
        let base = self.base_ref().ok_or_else(|| no_base_table("join"))?;
        if let Some(ty) = self.base_type() {
            if let Some(rel) = ty.relations().iter().find(|r| r.target == table) {
                match rel.kind {
                    RelationKind::OneToOne => {
                        return Ok(format!(
                            "{}.{} = {}.{}",
                            base,
                            rel.foreign_key,
                            reference,
                            self.key_of(table)
                        ));
                    }
                    RelationKind::OneToMany => {
                        let pk = ty.single_primary_key().unwrap_or("id");
                        return Ok(format!(
                            "{}.{} = {}.{}",
                            reference, rel.foreign_key, base, pk
                        ));
                    }
                    RelationKind::ManyToMany => {}
                }
            }
        }
        Ok(format!(
            "{}.{} = {}.id",
            base,
            foreign_key_for(table),
            reference
        ))
    }

    /// Join every unknown table `expr` references, then rewrite aliased
    /// qualifiers. With `select_refs`, columns of auto-joined tables are
    /// added to the select list.
    fn resolve(&mut self, expr: &str, select_refs: bool) -> Result<String> {
        let refs = table_refs(expr);
        for (table, _) in &refs {
            if self.is_known(table) {
                continue;
            }
            let on = self.default_predicate(table, table)?;
            tracing::trace!(table = %table, on = %on, "Auto-joining referenced table");
            self.joins.push(Join {
                kind: JoinKind::Left,
                table: table.clone(),
                alias: None,
                on,
            });
            self.auto_joined.insert(table.clone());
        }
        if select_refs {
            for (table, column) in &refs {
                if column == "*" || !self.auto_joined.contains(table) {
                    continue;
                }
                let field = format!("{}.{} AS {}_{}", table, column, table, column);
                if !self.auto_fields.contains(&field) {
                    self.auto_fields.push(field);
                }
            }
        }
        Ok(apply_aliases(expr, &self.aliases))
    }

    fn push_condition(
        mut self,
        clause: Clause,
        key: &str,
        op: Option<Operator>,
        value: Value,
    ) -> Result<Self> {
        let key = self.resolve(key, true)?;
        let sql = render_condition(&key, op, value, &mut self.params)?;
        let target = match clause {
            Clause::Where => &mut self.wheres,
            Clause::Having => &mut self.havings,
        };
        target.push(format!("({})", sql));
        self.results = None;
        Ok(self)
    }

    fn push_raw(mut self, clause: Clause, sql: &str) -> Result<Self> {
        let sql = self.resolve(sql, true)?;
        let target = match clause {
            Clause::Where => &mut self.wheres,
            Clause::Having => &mut self.havings,
        };
        target.push(format!("({})", sql));
        self.results = None;
        Ok(self)
    }

    /// Filter on `key`; the operator follows from the value (`IN` for lists,
    /// `LIKE` for `%` patterns, `IS NULL` for null, `=` otherwise).
    pub fn filter(self, key: &str, value: impl Into<Value>) -> Result<Self> {
        self.push_condition(Clause::Where, key, None, value.into())
    }

    pub fn filter_op(self, key: &str, op: &str, value: impl Into<Value>) -> Result<Self> {
        let op = Operator::parse(op)?;
        self.push_condition(Clause::Where, key, Some(op), value.into())
    }

    /// A raw SQL fragment, inserted verbatim.
    pub fn filter_raw(self, sql: &str) -> Result<Self> {
        self.push_raw(Clause::Where, sql)
    }

    /// Independent equality filters, one per pair.
    pub fn filter_each<I, K, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in pairs {
            self = self.push_condition(Clause::Where, key.as_ref(), None, value.into())?;
        }
        Ok(self)
    }

    pub fn having(self, key: &str, value: impl Into<Value>) -> Result<Self> {
        self.push_condition(Clause::Having, key, None, value.into())
    }

    pub fn having_op(self, key: &str, op: &str, value: impl Into<Value>) -> Result<Self> {
        let op = Operator::parse(op)?;
        self.push_condition(Clause::Having, key, Some(op), value.into())
    }

    pub fn having_raw(self, sql: &str) -> Result<Self> {
        self.push_raw(Clause::Having, sql)
    }

    /// Join `table`, optionally under `alias`. Without `on`, the predicate
    /// comes from the declared relations or the `<table>_id` convention.
    pub fn join(
        mut self,
        kind: &str,
        table: &str,
        alias: Option<&str>,
        on: Option<&str>,
    ) -> Result<Self> {
        let kind = JoinKind::parse(kind)?;
        if self.table.is_none() {
            return Err(no_base_table("join"));
        }
        if let Some(alias) = alias {
            self.aliases.insert(table.to_string(), alias.to_string());
        }
        let reference = alias.unwrap_or(table);
        let on = match on {
            Some(on) => apply_aliases(on, &self.aliases),
            None => self.default_predicate(table, reference)?,
        };
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on,
        });
        self.results = None;
        Ok(self)
    }

    /// Replace the select list.
    pub fn select<I, S>(mut self, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved = Vec::new();
        for field in fields {
            resolved.push(self.resolve(field.as_ref(), false)?);
        }
        self.fields = resolved;
        self.results = None;
        Ok(self)
    }

    pub fn order_by(mut self, key: &str) -> Result<Self> {
        let key = self.resolve(key, true)?;
        self.order_by.push(OrderBy::asc(key));
        self.results = None;
        Ok(self)
    }

    pub fn order_by_desc(mut self, key: &str) -> Result<Self> {
        let key = self.resolve(key, true)?;
        self.order_by.push(OrderBy::desc(key));
        self.results = None;
        Ok(self)
    }

    pub fn group_by(mut self, key: &str) -> Result<Self> {
        let key = self.resolve(key, true)?;
        self.group_by.push(key);
        self.results = None;
        Ok(self)
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self.results = None;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self.results = None;
        self
    }

    // ------------------------------------------------------------------
    // SQL assembly
    // ------------------------------------------------------------------

    fn from_clause(&self) -> Result<String> {
        let table = self.table.as_deref().ok_or_else(|| no_base_table("build"))?;
        let mut sql = table.to_string();
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        Ok(sql)
    }

    fn render(&self, limit: Option<u64>, ordered: bool) -> Result<String> {
        let base = self.base_ref().ok_or_else(|| no_base_table("build"))?;
        let mut fields = if self.fields.is_empty() {
            vec![format!("{}.*", base)]
        } else {
            self.fields.clone()
        };
        fields.extend(self.auto_fields.iter().cloned());
        self.render_fields(&fields, limit, ordered)
    }

    fn render_fields(&self, fields: &[String], limit: Option<u64>, ordered: bool) -> Result<String> {
        let mut sql = format!("SELECT {} FROM {}", fields.join(", "), self.from_clause()?);
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.havings.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.havings.join(" AND "));
        }
        let has_order = ordered && !self.order_by.is_empty();
        if has_order {
            let order: Vec<String> = self.order_by.iter().map(OrderBy::to_sql).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        sql.push_str(&limit_clause(
            self.conn.dialect(),
            limit,
            self.offset,
            has_order,
        ));
        tracing::trace!(sql = %sql, params = self.params.len(), "Built SELECT");
        Ok(sql)
    }

    /// The SQL text and its parameters.
    pub fn build(&self) -> Result<(String, Params)> {
        Ok((self.render(self.limit, true)?, self.params.clone()))
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    fn record_type(&self) -> Result<Arc<RecordType>> {
        if let Some(ty) = self.base_type() {
            return Ok(ty);
        }
        let table = self.table.as_deref().ok_or_else(|| no_base_table("fetch"))?;
        Ok(match self.types {
            Some(types) => types.resolve(table),
            None => Arc::new(RecordType::bare(table)),
        })
    }

    fn capped(&self, cap: u64) -> Option<u64> {
        Some(self.limit.map_or(cap, |l| l.min(cap)))
    }

    fn run(&self, limit: Option<u64>) -> Result<Vec<Row>> {
        let sql = self.render(limit, true)?;
        self.conn.query_with(&sql, &self.params)
    }

    /// Raw rows, bypassing the record cache.
    pub fn fetch_rows(&self) -> Result<Vec<Row>> {
        self.run(self.limit)
    }

    /// Materialized records, queried once and cached.
    pub fn records(&mut self) -> Result<&[Record]> {
        if self.results.is_none() {
            let ty = self.record_type()?;
            let rows = self.run(self.limit)?;
            tracing::debug!(table = %ty.table(), rows = rows.len(), "Materialized query");
            self.results = Some(
                rows.into_iter()
                    .map(|row| Record::from_row(Arc::clone(&ty), row))
                    .collect(),
            );
        }
        Ok(self.results.as_deref().unwrap_or_default())
    }

    pub fn is_materialized(&self) -> bool {
        self.results.is_some()
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.records()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.records()?.is_empty())
    }

    pub fn get(&mut self, index: usize) -> Result<Option<&Record>> {
        Ok(self.records()?.get(index))
    }

    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, Record>> {
        Ok(self.records()?.iter())
    }

    pub fn into_records(mut self) -> Result<Vec<Record>> {
        self.records()?;
        Ok(self.results.take().unwrap_or_default())
    }

    /// All rows as records.
    pub fn fetch_all(&mut self) -> Result<Vec<Record>> {
        Ok(self.records()?.to_vec())
    }

    /// The first record, if any.
    pub fn fetch_one(&self) -> Result<Option<Record>> {
        if let Some(results) = &self.results {
            return Ok(results.first().cloned());
        }
        let ty = self.record_type()?;
        let rows = self.run(self.capped(1))?;
        Ok(rows.into_iter().next().map(|row| Record::from_row(ty, row)))
    }

    /// The first column of the first row.
    pub fn fetch_value(&self) -> Result<Option<Value>> {
        let rows = self.run(self.capped(1))?;
        Ok(rows.into_iter().next().and_then(Row::into_first))
    }

    /// The first column of every row.
    pub fn fetch_column(&self) -> Result<Vec<Value>> {
        let rows = self.run(self.limit)?;
        Ok(rows.into_iter().filter_map(Row::into_first).collect())
    }

    /// First column as key, second column as value.
    ///
    /// Keys are normalized so `1` and `"1"` collide; later rows win.
    pub fn fetch_map(&self) -> Result<BTreeMap<String, Value>> {
        let rows = self.run(self.limit)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let key = row.get(0)?.to_key();
                Some((key, row.get(1).cloned().unwrap_or(Value::Null)))
            })
            .collect())
    }

    /// Exactly one record; zero or several rows are errors.
    pub fn fetch_only_one(&self) -> Result<Record> {
        let ty = self.record_type()?;
        let mut rows = self.run(self.capped(2))?;
        match rows.len() {
            1 => Ok(Record::from_row(ty, rows.remove(0))),
            0 => Err(Error::record(
                RecordErrorKind::NotFound,
                format!("no {} row matched", ty.table()),
            )),
            _ => Err(Error::record(
                RecordErrorKind::MultipleRows,
                format!("more than one {} row matched", ty.table()),
            )),
        }
    }

    /// `COUNT(*)` over the query.
    pub fn count_rows(&self) -> Result<u64> {
        let plain = self.group_by.is_empty()
            && self.havings.is_empty()
            && self.limit.is_none()
            && self.offset.is_none();
        let sql = if plain {
            format!("SELECT COUNT(*) FROM {}", self.from_clause()?)
        } else {
            let paged = self.limit.is_some() || self.offset.is_some();
            format!(
                "SELECT COUNT(*) FROM ({}) AS counted",
                self.render(self.limit, paged)?
            )
        };
        let value = self
            .conn
            .query_with(&sql, &self.params)?
            .into_iter()
            .next()
            .and_then(Row::into_first)
            .unwrap_or(Value::Int(0));
        Ok(value
            .as_i64()
            .or_else(|| value.to_key().parse().ok())
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Mutations over the matched rows
    // ------------------------------------------------------------------

    /// WHERE condition that selects the matched rows of the base table.
    ///
    /// Joined, aliased, grouped or paged queries go through a primary-key
    /// subquery carrying every clause of the SELECT, so `limit(1).delete()`
    /// touches one row.
    fn scope(&self) -> Result<Option<String>> {
        let table = self.table.as_deref().ok_or_else(|| no_base_table("mutate"))?;
        let direct = self.joins.is_empty()
            && self.alias.is_none()
            && self.group_by.is_empty()
            && self.havings.is_empty()
            && self.limit.is_none()
            && self.offset.is_none();
        if direct {
            return Ok((!self.wheres.is_empty()).then(|| self.wheres.join(" AND ")));
        }
        let pk = self.record_type()?.single_primary_key()?.to_string();
        let base = self.base_ref().unwrap_or(table);
        let inner = self.render_fields(&[format!("{}.{}", base, pk)], self.limit, true)?;
        Ok(Some(format!(
            "{} IN (SELECT {} FROM ({}) AS scoped)",
            pk, pk, inner
        )))
    }

    /// Delete the matched rows of the base table.
    pub fn delete(&mut self) -> Result<u64> {
        let table = self.table.clone().ok_or_else(|| no_base_table("delete"))?;
        let mut builder = DeleteBuilder::new(table);
        if let Some(scope) = self.scope()? {
            builder = builder.scope(scope, self.params.clone());
        }
        let (sql, params) = builder.build();
        self.results = None;
        self.conn.execute_with(&sql, &params)
    }

    /// Set `values` on the matched rows of the base table.
    pub fn update<I, K, V>(&mut self, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let table = self.table.clone().ok_or_else(|| no_base_table("update"))?;
        let mut builder = UpdateBuilder::new(table);
        if let Some(scope) = self.scope()? {
            builder = builder.scope(scope, self.params.clone());
        }
        for (column, value) in values {
            builder = builder.set(column, value);
        }
        if builder.is_empty() {
            return Ok(0);
        }
        let (sql, params) = builder.build();
        self.results = None;
        self.conn.execute_with(&sql, &params)
    }

    // ------------------------------------------------------------------
    // Relation prefetch
    // ------------------------------------------------------------------

    /// Load `relation` for every materialized record in a bounded number of
    /// queries.
    pub fn prefetch(&mut self, relation: &str) -> Result<()> {
        self.records()?;
        let mut records = self.results.take().unwrap_or_default();
        let outcome = eager::inject(self.conn, self.types, &mut records, relation);
        self.results = Some(records);
        outcome.map(|_| ())
    }

    /// [`prefetch`](Self::prefetch) every declared relation.
    pub fn prefetch_all(&mut self) -> Result<()> {
        let ty = self.record_type()?;
        for relation in ty.relations() {
            self.prefetch(&relation.name)?;
        }
        Ok(())
    }
}

/// Row limiting in the dialect's syntax.
fn limit_clause(dialect: Dialect, limit: Option<u64>, offset: Option<u64>, ordered: bool) -> String {
    match (dialect, limit, offset) {
        (_, None, None) => String::new(),
        (Dialect::Mssql, limit, offset) => {
            let mut sql = String::new();
            if !ordered {
                sql.push_str(" ORDER BY (SELECT NULL)");
            }
            sql.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
            if let Some(limit) = limit {
                sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
            }
            sql
        }
        (_, Some(limit), None) => format!(" LIMIT {}", limit),
        (_, Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
        (Dialect::Postgres, None, Some(offset)) => format!(" OFFSET {}", offset),
        (Dialect::Mysql, None, Some(offset)) => format!(" LIMIT {} OFFSET {}", u64::MAX, offset),
        (Dialect::Sqlite, None, Some(offset)) => format!(" LIMIT -1 OFFSET {}", offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlrecord_core::placeholder_names;
    use sqlrecord_core::testing::RecordingDriver;
    use sqlrecord_core::ConnectionParams;

    fn conn(dialect: Dialect) -> (Connection, RecordingDriver) {
        let driver = RecordingDriver::new(dialect);
        let conn = Connection::with_driver(ConnectionParams::new(dialect), Box::new(driver.clone()));
        (conn, driver)
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        Row::new(
            pairs.iter().map(|(k, _)| (*k).to_string()).collect(),
            pairs.iter().map(|(_, v)| v.clone()).collect(),
        )
    }

    fn assert_parity(sql: &str, params: &Params) {
        let mut names = placeholder_names(sql);
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(total, names.len(), "placeholder used twice in {}", sql);
        assert_eq!(names.len(), params.len(), "{}", sql);
        for name in &names {
            assert!(params.contains(name), "missing {} for {}", name, sql);
        }
    }

    #[test]
    fn test_auto_join() {
        let (conn, _) = conn(Dialect::Sqlite);
        let (sql, params) = Query::table(&conn, "post")
            .filter("author.name", "Jane")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT post.*, author.name AS author_name FROM post \
             LEFT JOIN author ON post.author_id = author.id WHERE (author.name = :p0)"
        );
        assert_eq!(params.get("p0"), Some(&Value::from("Jane")));
    }

    #[test]
    fn test_auto_join_once_per_table() {
        let (conn, _) = conn(Dialect::Sqlite);
        let q = Query::table(&conn, "post")
            .filter("author.name", "Jane")
            .unwrap()
            .order_by("author.age")
            .unwrap();
        assert_eq!(q.joins().len(), 1);
        let (sql, _) = q.build().unwrap();
        assert!(sql.contains("author.name AS author_name, author.age AS author_age"));
        assert!(sql.ends_with("ORDER BY author.age ASC"));
    }

    #[test]
    fn test_relation_aware_predicate() {
        let (conn, _) = conn(Dialect::Sqlite);
        let types = TypeRegistry::new();
        types.register(RecordType::builder("post").has_many("comments").build());
        let (sql, _) = Query::table(&conn, "post")
            .with_types(&types)
            .filter_op("comment.score", ">", 3)
            .unwrap()
            .build()
            .unwrap();
        assert!(sql.contains("LEFT JOIN comment ON comment.post_id = post.id"));
    }

    #[test]
    fn test_explicit_join_and_aliases() {
        let (conn, _) = conn(Dialect::Postgres);
        let (sql, _) = Query::new(&conn)
            .from_as("post", "p")
            .join("inner", "author", Some("a"), None)
            .unwrap()
            .filter("author.name", "Jane")
            .unwrap()
            .filter("post.title", "Hi")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT p.* FROM post AS p INNER JOIN author AS a ON p.author_id = a.id \
             WHERE (a.name = :p0) AND (p.title = :p1)"
        );
    }

    #[test]
    fn test_join_errors() {
        let (conn, _) = conn(Dialect::Sqlite);
        let err = Query::new(&conn).join("left", "author", None, None).unwrap_err();
        assert!(matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::NoBaseTable));

        let err = Query::new(&conn).filter("author.name", "x").unwrap_err();
        assert!(matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::NoBaseTable));

        let err = Query::table(&conn, "post")
            .join("diagonal", "author", None, None)
            .unwrap_err();
        assert!(
            matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::UnsupportedJoinType)
        );
    }

    #[test]
    fn test_placeholder_parity() {
        let (conn, _) = conn(Dialect::Mysql);
        let q = Query::table(&conn, "post")
            .filter("title", "A%")
            .unwrap()
            .filter("id", vec![1i64, 2, 3])
            .unwrap()
            .filter_op("views", "between", [10, 20])
            .unwrap()
            .filter("deleted_at", Value::Null)
            .unwrap()
            .filter("LOWER(slug) = ?", "x")
            .unwrap()
            .filter_raw("published = 1")
            .unwrap()
            .join("left", "author", None, Some("author.id = post.author_id"))
            .unwrap()
            .filter("author.name", "Jane")
            .unwrap()
            .group_by("post.id")
            .unwrap()
            .having_op("COUNT(post.id)", ">", 0)
            .unwrap()
            .limit(5);
        let (sql, params) = q.build().unwrap();
        assert_parity(&sql, &params);
        assert_eq!(params.len(), 9);
        assert!(sql.ends_with(" LIMIT 5"));
    }

    #[test]
    fn test_filter_each() {
        let (conn, _) = conn(Dialect::Sqlite);
        let (sql, params) = Query::table(&conn, "author")
            .filter_each([("name", Value::from("Jane")), ("age", Value::from(40))])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT author.* FROM author WHERE (name = :p0) AND (age = :p1)"
        );
        assert_parity(&sql, &params);
    }

    #[test]
    fn test_limit_clauses() {
        assert_eq!(limit_clause(Dialect::Sqlite, Some(10), Some(20), true), " LIMIT 10 OFFSET 20");
        assert_eq!(limit_clause(Dialect::Sqlite, None, Some(5), true), " LIMIT -1 OFFSET 5");
        assert_eq!(limit_clause(Dialect::Postgres, None, Some(5), false), " OFFSET 5");
        assert_eq!(
            limit_clause(Dialect::Mssql, Some(10), None, false),
            " ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            limit_clause(Dialect::Mssql, Some(10), Some(30), true),
            " OFFSET 30 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(limit_clause(Dialect::Mysql, None, None, true), "");
    }

    #[test]
    fn test_results_are_cached() {
        let (conn, driver) = conn(Dialect::Sqlite);
        driver.push_rows(vec![
            row(&[("id", Value::Int(1)), ("name", "a".into())]),
            row(&[("id", Value::Int(2)), ("name", "b".into())]),
        ]);
        let mut q = Query::table(&conn, "author");
        assert_eq!(q.len().unwrap(), 2);
        assert_eq!(q.get(1).unwrap().unwrap().value("name"), Some(&Value::from("b")));
        let names: Vec<_> = q.iter().unwrap().map(|r| r.value("id").cloned()).collect();
        assert_eq!(names.len(), 2);
        assert_eq!(driver.statements().len(), 1);

        let mut q = q.limit(1);
        assert!(!q.is_materialized());
        assert!(q.is_empty().unwrap());
        assert_eq!(driver.statements().len(), 2);
    }

    #[test]
    fn test_fetch_shapes() {
        let (conn, driver) = conn(Dialect::Sqlite);
        let q = Query::table(&conn, "author").select(["id", "name"]).unwrap();

        driver.push_rows(vec![row(&[("id", Value::Int(1)), ("name", "a".into())])]);
        assert_eq!(q.fetch_value().unwrap(), Some(Value::Int(1)));
        assert!(driver.sql().last().unwrap().ends_with("LIMIT 1"));

        driver.push_rows(vec![
            row(&[("id", Value::Int(1)), ("name", "a".into())]),
            row(&[("id", Value::Text("2".into())), ("name", "b".into())]),
        ]);
        let map = q.fetch_map().unwrap();
        assert_eq!(map.get("2"), Some(&Value::from("b")));

        driver.push_rows(vec![row(&[("id", Value::Int(1))]), row(&[("id", Value::Int(2))])]);
        assert_eq!(q.fetch_column().unwrap(), vec![Value::Int(1), Value::Int(2)]);

        driver.push_rows(Vec::new());
        assert!(q.fetch_one().unwrap().is_none());
    }

    #[test]
    fn test_fetch_only_one() {
        let (conn, driver) = conn(Dialect::Sqlite);
        let q = Query::table(&conn, "author").filter("id", 1).unwrap();

        driver.push_rows(Vec::new());
        let err = q.fetch_only_one().unwrap_err();
        assert!(matches!(err, Error::Record(ref e) if e.kind == RecordErrorKind::NotFound));

        driver.push_rows(vec![row(&[("id", Value::Int(1))]), row(&[("id", Value::Int(1))])]);
        let err = q.fetch_only_one().unwrap_err();
        assert!(matches!(err, Error::Record(ref e) if e.kind == RecordErrorKind::MultipleRows));

        driver.push_rows(vec![row(&[("id", Value::Int(1))])]);
        assert_eq!(q.fetch_only_one().unwrap().id().unwrap(), Value::Int(1));
        assert!(driver.sql().last().unwrap().ends_with("LIMIT 2"));
    }

    #[test]
    fn test_count_rows() {
        let (conn, driver) = conn(Dialect::Sqlite);
        driver.push_rows(vec![row(&[("COUNT(*)", Value::Int(3))])]);
        let q = Query::table(&conn, "post").filter("author.name", "Jane").unwrap();
        assert_eq!(q.count_rows().unwrap(), 3);
        assert_eq!(
            driver.sql()[0],
            "SELECT COUNT(*) FROM post LEFT JOIN author ON post.author_id = author.id \
             WHERE (author.name = :p0)"
        );

        driver.push_rows(vec![row(&[("n", Value::Text("4".into()))])]);
        assert_eq!(q.limit(10).count_rows().unwrap(), 4);
        assert!(driver.sql()[1].starts_with("SELECT COUNT(*) FROM (SELECT post.*"));

        let having = Query::table(&conn, "post").having_op("views", ">", 10).unwrap();
        having.count_rows().unwrap();
        let statements = driver.statements();
        assert_eq!(
            statements[2].sql,
            "SELECT COUNT(*) FROM (SELECT post.* FROM post HAVING (views > :p0)) AS counted"
        );
        assert_parity(&statements[2].sql, &statements[2].params);
    }

    #[test]
    fn test_update_and_delete() {
        let (conn, driver) = conn(Dialect::Sqlite);
        let mut q = Query::table(&conn, "post").filter("views", 0).unwrap();
        q.update([("archived", 1)]).unwrap();
        q.delete().unwrap();
        let statements = driver.statements();
        assert_eq!(statements[0].sql, "UPDATE post SET archived = :p1 WHERE (views = :p0)");
        assert_parity(&statements[0].sql, &statements[0].params);
        assert_eq!(statements[1].sql, "DELETE FROM post WHERE (views = :p0)");

        let mut joined = Query::table(&conn, "post").filter("author.name", "x").unwrap();
        joined.delete().unwrap();
        assert_eq!(
            driver.sql()[2],
            "DELETE FROM post WHERE id IN (SELECT id FROM (SELECT post.id FROM post \
             LEFT JOIN author ON post.author_id = author.id WHERE (author.name = :p0)) AS scoped)"
        );
    }

    #[test]
    fn test_mutations_keep_limit_and_having() {
        let (conn, driver) = conn(Dialect::Sqlite);
        let mut first = Query::table(&conn, "post")
            .filter("views", 0)
            .unwrap()
            .order_by("id")
            .unwrap()
            .limit(1);
        first.delete().unwrap();

        let mut popular = Query::table(&conn, "post")
            .group_by("author_id")
            .unwrap()
            .having_op("COUNT(*)", ">", 2)
            .unwrap();
        popular.update([("featured", 1)]).unwrap();

        let statements = driver.statements();
        assert_eq!(
            statements[0].sql,
            "DELETE FROM post WHERE id IN (SELECT id FROM (SELECT post.id FROM post \
             WHERE (views = :p0) ORDER BY id ASC LIMIT 1) AS scoped)"
        );
        assert_parity(&statements[0].sql, &statements[0].params);
        assert_eq!(
            statements[1].sql,
            "UPDATE post SET featured = :p1 WHERE id IN (SELECT id FROM (SELECT post.id \
             FROM post GROUP BY author_id HAVING (COUNT(*) > :p0)) AS scoped)"
        );
        assert_parity(&statements[1].sql, &statements[1].params);
    }
}
