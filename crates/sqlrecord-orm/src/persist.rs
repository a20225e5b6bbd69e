//! Writing records back: save, remove and many-to-many links.

use crate::mapper::Mapper;
use sqlrecord_core::{
    Error, Record, RecordType, Related, Relation, RelationKind, Result, UsageErrorKind, Value,
};
use sqlrecord_query::{DeleteBuilder, InsertBuilder, Query, UpdateBuilder};
use std::collections::BTreeSet;

fn same_key(current: Option<&Value>, id: &Value) -> bool {
    current.is_some_and(|v| !v.is_null() && v.to_key() == id.to_key())
}

fn many_to_many<'t>(ty: &'t RecordType, relation: &str) -> Result<&'t Relation> {
    match ty.relation(relation) {
        Some(rel) if rel.kind == RelationKind::ManyToMany && rel.join_table.is_some() => Ok(rel),
        Some(_) => Err(Error::usage(
            UsageErrorKind::UnknownRelation,
            format!("{}.{} is not a many-to-many relation", ty.table(), relation),
        )),
        None => Err(Error::usage(
            UsageErrorKind::UnknownRelation,
            format!("{} has no relation named '{}'", ty.table(), relation),
        )),
    }
}

impl Mapper<'_> {
    /// Persist `record`.
    ///
    /// Records without an identity are inserted and receive the generated
    /// key. Records with one get an UPDATE of the changed columns only; an
    /// unchanged record issues nothing. A record that was never loaded but
    /// carries a caller-assigned key is inserted when no row matches it.
    ///
    /// Cached one-to-one targets are saved first and their keys written into
    /// the owner. Cached one-to-many children are saved after it with their
    /// foreign key pointed at the owner; cached many-to-many targets are
    /// saved and linked unless the join table already links them.
    ///
    /// Returns whether a statement was issued for `record` itself.
    pub fn save(&self, record: &mut Record) -> Result<bool> {
        let ty = std::sync::Arc::clone(record.record_type());

        for rel in ty.relations() {
            if rel.kind == RelationKind::OneToOne {
                self.save_owned_target(record, rel)?;
            }
        }

        let written = if record.exists() {
            self.update(record, &ty)?
        } else {
            self.insert(record, &ty)?;
            true
        };

        for rel in ty.relations() {
            if rel.kind != RelationKind::OneToOne {
                self.save_children(record, rel)?;
            }
        }
        Ok(written)
    }

    fn save_owned_target(&self, record: &mut Record, rel: &Relation) -> Result<()> {
        let Some(mut related) = record.take_related(&rel.name) else {
            return Ok(());
        };
        let outcome = match &mut related {
            Related::One(Some(target)) => self.save(target).and_then(|_| target.id().map(Some)),
            _ => Ok(None),
        };
        record.restore_related(&rel.name, related);
        if let Some(id) = outcome? {
            if !same_key(record.value(&rel.foreign_key), &id) {
                record.set_raw(&rel.foreign_key, id);
            }
        }
        Ok(())
    }

    fn save_children(&self, record: &mut Record, rel: &Relation) -> Result<()> {
        let Some(mut related) = record.take_related(&rel.name) else {
            return Ok(());
        };
        let outcome = self.save_collection(record, rel, &mut related);
        record.restore_related(&rel.name, related);
        outcome
    }

    fn save_collection(&self, owner: &Record, rel: &Relation, related: &mut Related) -> Result<()> {
        let Related::Many(children) = related else {
            return Ok(());
        };
        let owner_id = match rel.kind {
            RelationKind::OneToMany => Some(owner.id()?),
            _ => None,
        };
        for child in children.iter_mut() {
            if let Some(id) = &owner_id {
                if !same_key(child.value(&rel.foreign_key), id) {
                    child.set_raw(&rel.foreign_key, id.clone());
                }
            }
            self.save(child)?;
        }
        if rel.kind == RelationKind::ManyToMany && !children.is_empty() {
            self.link_missing(owner, rel, children)?;
        }
        Ok(())
    }

    /// Write join-table rows for `targets` not linked to `owner` yet.
    fn link_missing(&self, owner: &Record, rel: &Relation, targets: &[Record]) -> Result<()> {
        let Some(join) = rel.join_table.as_ref() else {
            return Ok(());
        };
        let owner_id = owner.id()?;
        let mut linked: BTreeSet<String> = Query::table(self.conn, &join.table)
            .select([join.target_column.as_str()])?
            .filter(&join.owner_column, owner_id.clone())?
            .fetch_column()?
            .iter()
            .map(Value::to_key)
            .collect();

        for target in targets {
            let target_id = target.id()?;
            if !linked.insert(target_id.to_key()) {
                continue;
            }
            let (sql, params) = InsertBuilder::new(join.table.as_str())
                .value(join.owner_column.as_str(), owner_id.clone())
                .value(join.target_column.as_str(), target_id)
                .build(self.conn.dialect());
            self.conn.execute_with(&sql, &params)?;
        }
        Ok(())
    }

    fn insert(&self, record: &mut Record, ty: &RecordType) -> Result<()> {
        let values: Vec<(String, Value)> = record
            .fields()
            .iter()
            .filter(|(name, value)| !value.is_null() && ty.has_column(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let (sql, params) = InsertBuilder::new(ty.table())
            .values(values)
            .build(self.conn.dialect());
        self.conn.execute_with(&sql, &params)?;

        if let [pk] = ty.primary_key() {
            if record.value(pk).is_none_or(Value::is_null) {
                if let Some(id) = self.conn.last_insert_id()? {
                    record.set_raw(pk, id);
                }
            }
        }
        record.mark_persisted();
        tracing::debug!(table = ty.table(), id = ?record.id().ok(), "Inserted record");
        Ok(())
    }

    fn update(&self, record: &mut Record, ty: &RecordType) -> Result<bool> {
        let pk = ty.primary_key();
        let changes: Vec<(String, Value)> = record
            .changes()
            .into_iter()
            .filter(|(name, _)| ty.has_column(name) && !pk.contains(name))
            .collect();
        let fresh = record.original().is_empty();
        if changes.is_empty() {
            if fresh {
                self.insert(record, ty)?;
                return Ok(true);
            }
            tracing::trace!(table = ty.table(), "Nothing to update");
            return Ok(false);
        }

        let mut builder = UpdateBuilder::new(ty.table());
        for column in pk {
            builder = builder.key(column, record.value(column).cloned().unwrap_or(Value::Null));
        }
        let columns: Vec<&str> = changes.iter().map(|(c, _)| c.as_str()).collect();
        tracing::debug!(table = ty.table(), columns = ?columns, "Updating changed columns");
        for (column, value) in changes {
            builder = builder.set(column, value);
        }
        let (sql, params) = builder.build();
        let affected = self.conn.execute_with(&sql, &params)?;
        if affected == 0 && fresh {
            tracing::debug!(table = ty.table(), "No row has the assigned key, inserting");
            self.insert(record, ty)?;
            return Ok(true);
        }
        record.mark_persisted();
        Ok(true)
    }

    /// Delete `record` by primary key. A record without an identity is left
    /// alone.
    pub fn remove(&self, record: &mut Record) -> Result<bool> {
        if !record.exists() {
            return Ok(false);
        }
        let ty = std::sync::Arc::clone(record.record_type());
        let mut builder = DeleteBuilder::new(ty.table());
        for column in ty.primary_key() {
            builder = builder.key(column, record.value(column).cloned().unwrap_or(Value::Null));
        }
        let (sql, params) = builder.build();
        self.conn.execute_with(&sql, &params)?;
        tracing::debug!(table = ty.table(), "Removed record");
        record.clear_id();
        Ok(true)
    }

    /// Insert the join-table row linking `record` to `target`.
    ///
    /// A cached collection for `relation` gains `target`.
    pub fn link(&self, record: &mut Record, relation: &str, target: &Record) -> Result<()> {
        let ty = std::sync::Arc::clone(record.record_type());
        let rel = many_to_many(&ty, relation)?;
        let Some(join) = rel.join_table.as_ref() else {
            return Ok(());
        };
        let owner_id = record.id()?;
        let target_id = target.id()?;
        let (sql, params) = InsertBuilder::new(join.table.as_str())
            .value(join.owner_column.as_str(), owner_id)
            .value(join.target_column.as_str(), target_id.clone())
            .build(self.conn.dialect());
        self.conn.execute_with(&sql, &params)?;

        if let Some(Related::Many(cached)) = record.related_mut(relation) {
            let present = cached
                .iter()
                .any(|r| r.id().is_ok_and(|id| id.to_key() == target_id.to_key()));
            if !present {
                cached.push(target.clone());
            }
        }
        Ok(())
    }

    /// Delete the join-table row linking `record` to `target`.
    pub fn unlink(&self, record: &mut Record, relation: &str, target: &Record) -> Result<()> {
        let ty = std::sync::Arc::clone(record.record_type());
        let rel = many_to_many(&ty, relation)?;
        let Some(join) = rel.join_table.as_ref() else {
            return Ok(());
        };
        let target_id = target.id()?;
        let (sql, params) = DeleteBuilder::new(join.table.as_str())
            .key(&join.owner_column, record.id()?)
            .key(&join.target_column, target_id.clone())
            .build();
        self.conn.execute_with(&sql, &params)?;

        if let Some(Related::Many(cached)) = record.related_mut(relation) {
            cached.retain(|r| !r.id().is_ok_and(|id| id.to_key() == target_id.to_key()));
        }
        Ok(())
    }
}
