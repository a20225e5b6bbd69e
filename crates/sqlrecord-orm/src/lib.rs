//! Active-record mapper for SQLRecord.
//!
//! `sqlrecord-orm` is the **mapping layer**. Records are plain values
//! ([`Record`](sqlrecord_core::Record)); a [`Mapper`] holds the connection and
//! the type registry and does everything that needs the database.
//!
//! # Role In The Architecture
//!
//! - **Lookup**: `find`, `query` and lazy relation access through
//!   [`Mapper::field`] / [`Mapper::resolve`].
//! - **Persistence**: `save` inserts or diff-updates, cascading through
//!   cached relations; `remove`; `link`/`unlink` for join-table rows.
//! - **Batch loading**: [`Mapper::inject`] loads a relation for many records
//!   at once.
//! - **Schema**: `register_with_schema` fills column types from the live
//!   table or naming conventions; `create_table_for` emits the DDL.
//!
//! # Example
//!
//! ```ignore
//! let mapper = Mapper::new(&conn, &types);
//! if let Some(mut post) = mapper.find("post", 1)? {
//!     post.set("title", "Renamed");
//!     mapper.save(&mut post)?; // UPDATE post SET title = :p0 WHERE id = :id
//! }
//! ```

pub mod mapper;
pub mod persist;
pub mod registration;

pub use mapper::Mapper;
