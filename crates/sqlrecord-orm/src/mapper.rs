//! The active-record mapper.
//!
//! A [`Mapper`] pairs a connection with a type registry. Records stay plain
//! values; everything that touches the database goes through the mapper.

use sqlrecord_core::{
    Connection, Error, Field, Record, Related, Result, TypeRegistry, UsageErrorKind, Value,
};
use sqlrecord_query::{Query, eager};

/// Loads, resolves and persists records of registered types.
#[derive(Debug, Clone, Copy)]
pub struct Mapper<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) types: &'a TypeRegistry,
}

impl<'a> Mapper<'a> {
    pub fn new(conn: &'a Connection, types: &'a TypeRegistry) -> Self {
        Self { conn, types }
    }

    pub fn connection(&self) -> &'a Connection {
        self.conn
    }

    pub fn types(&self) -> &'a TypeRegistry {
        self.types
    }

    /// A query over `table` that materializes records of its registered type.
    pub fn query(&self, table: &str) -> Result<Query<'a>> {
        let ty = self.types.require(table)?;
        Ok(Query::table(self.conn, table)
            .with_types(self.types)
            .target(ty))
    }

    /// Load one record by primary key.
    #[tracing::instrument(level = "debug", skip(self, id))]
    pub fn find(&self, table: &str, id: impl Into<Value>) -> Result<Option<Record>> {
        let ty = self.types.require(table)?;
        let pk = ty.single_primary_key()?;
        self.query(table)?.filter(pk, id.into())?.fetch_one()
    }

    /// Field access with lazy relation loading.
    ///
    /// Virtual accessors and raw fields win; a declared relation that is not
    /// cached yet is loaded first. Unknown names give [`Field::Null`].
    pub fn field<'r>(&self, record: &'r mut Record, name: &str) -> Result<Field<'r>> {
        let ty = record.record_type();
        let shadowed = ty.accessor(name).is_some_and(|a| a.getter.is_some())
            || record.value(name).is_some();
        if !shadowed && ty.relation(name).is_some() && !record.is_loaded(name) {
            self.load(record, name)?;
        }
        let record: &'r Record = record;
        Ok(record.get(name))
    }

    /// The cached value of `relation`, loading it on first access.
    pub fn resolve<'r>(&self, record: &'r mut Record, relation: &str) -> Result<&'r Related> {
        if !record.is_loaded(relation) {
            self.load(record, relation)?;
        }
        let record: &'r Record = record;
        record.related(relation).ok_or_else(|| {
            Error::usage(
                UsageErrorKind::UnknownRelation,
                format!("{} has no relation named '{}'", record.table(), relation),
            )
        })
    }

    fn load(&self, record: &mut Record, relation: &str) -> Result<()> {
        tracing::trace!(table = record.table(), relation, "Lazy relation load");
        eager::inject(
            self.conn,
            Some(self.types),
            std::slice::from_mut(record),
            relation,
        )?;
        Ok(())
    }

    /// Load `relation` for all `records` in a bounded number of queries.
    ///
    /// Returns the number of queries issued.
    pub fn inject(&self, records: &mut [Record], relation: &str) -> Result<usize> {
        eager::inject(self.conn, Some(self.types), records, relation)
    }
}
