//! Fluent SQL query builder for SQLRecord.
//!
//! `sqlrecord-query` is the **query construction layer**. It turns a chain of
//! builder calls into SQL plus named parameters and runs it through a
//! [`Connection`](sqlrecord_core::Connection).
//!
//! # Role In The Architecture
//!
//! - **[`Query`]**: SELECT assembly with automatic joins for dotted
//!   `table.column` references, dialect-aware paging and cached results.
//! - **Statement builders**: [`InsertBuilder`], [`UpdateBuilder`] and
//!   [`DeleteBuilder`] for single-table writes.
//! - **Batch loading**: [`eager::inject`] resolves a relation for many
//!   records in a bounded number of queries.
//!
//! Every literal is bound through a placeholder; only raw fragments passed to
//! [`Query::filter_raw`] reach the SQL text verbatim.

pub mod builder;
pub mod clause;
pub mod eager;
pub mod join;
pub mod select;

pub use builder::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use clause::{Operator, OrderBy, OrderDirection, bindable, render_condition};
pub use eager::inject;
pub use join::{Join, JoinKind, apply_aliases, table_refs};
pub use select::Query;
