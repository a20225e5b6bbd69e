//! Batch relation loading.
//!
//! [`inject`] resolves one relation for a whole slice of records with a
//! bounded number of queries: one for one-to-one and one-to-many relations,
//! two for many-to-many (the join-table mapping, then the targets). Results
//! are matched back by normalized key and written into each record's relation
//! cache, replacing whatever was cached before.

use crate::select::Query;
use sqlrecord_core::{
    Connection, Error, Record, RecordType, Relation, RelationKind, Result, TypeRegistry,
    UsageErrorKind, Value,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Distinct non-null keys, in first-seen order.
fn distinct_keys<'r>(values: impl Iterator<Item = Option<&'r Value>>) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for value in values.flatten() {
        if value.is_null() {
            continue;
        }
        if seen.insert(value.to_key()) {
            keys.push(value.clone());
        }
    }
    keys
}

fn key_of(record: &Record, column: &str) -> Option<String> {
    record
        .value(column)
        .filter(|v| !v.is_null())
        .map(Value::to_key)
}

fn target_type(types: Option<&TypeRegistry>, table: &str) -> Arc<RecordType> {
    match types {
        Some(types) => types.resolve(table),
        None => Arc::new(RecordType::bare(table)),
    }
}

fn target_query<'a>(
    conn: &'a Connection,
    types: Option<&'a TypeRegistry>,
    ty: &Arc<RecordType>,
) -> Query<'a> {
    let query = Query::table(conn, ty.table()).target(Arc::clone(ty));
    match types {
        Some(types) => query.with_types(types),
        None => query,
    }
}

/// Load `relation` into every record of `records`.
///
/// All records must share one record type. Returns the number of queries
/// issued; an empty slice or a slice without any usable key issues none.
#[tracing::instrument(level = "debug", skip(conn, types, records), fields(parents = records.len()))]
pub fn inject(
    conn: &Connection,
    types: Option<&TypeRegistry>,
    records: &mut [Record],
    relation: &str,
) -> Result<usize> {
    let Some(first) = records.first() else {
        return Ok(0);
    };
    let owner = Arc::clone(first.record_type());
    let rel = owner.relation(relation).cloned().ok_or_else(|| {
        Error::usage(
            UsageErrorKind::UnknownRelation,
            format!("{} has no relation named '{}'", owner.table(), relation),
        )
    })?;
    let target = target_type(types, &rel.target);

    let (key_count, query_count) = match rel.kind {
        RelationKind::OneToOne => inject_one(conn, types, records, &rel, &target)?,
        RelationKind::OneToMany => inject_many(conn, types, records, &rel, &owner, &target)?,
        RelationKind::ManyToMany => {
            inject_through(conn, types, records, &rel, &owner, &target)?
        }
    };

    tracing::debug!(
        relation = %rel.name,
        kind = %rel.kind,
        parent_count = records.len(),
        key_count = key_count,
        query_count = query_count,
        "Injected relation"
    );
    Ok(query_count)
}

/// Owner carries the key: `post.author_id -> author.id`.
fn inject_one(
    conn: &Connection,
    types: Option<&TypeRegistry>,
    records: &mut [Record],
    rel: &Relation,
    target: &Arc<RecordType>,
) -> Result<(usize, usize)> {
    let keys = distinct_keys(records.iter().map(|r| r.value(&rel.foreign_key)));
    let key_count = keys.len();
    if keys.is_empty() {
        for record in records.iter_mut() {
            record.set_one(&rel.name, None);
        }
        return Ok((0, 0));
    }

    let target_pk = target.single_primary_key()?;
    let found = target_query(conn, types, target)
        .filter(target_pk, Value::Array(keys))?
        .into_records()?;
    let by_key: BTreeMap<String, Record> = found
        .into_iter()
        .filter_map(|r| key_of(&r, target_pk).map(|k| (k, r)))
        .collect();

    for record in records.iter_mut() {
        let related = key_of(record, &rel.foreign_key).and_then(|k| by_key.get(&k).cloned());
        record.set_one(&rel.name, related);
    }
    Ok((key_count, 1))
}

/// Targets carry the key: `comment.post_id -> post.id`.
fn inject_many(
    conn: &Connection,
    types: Option<&TypeRegistry>,
    records: &mut [Record],
    rel: &Relation,
    owner: &RecordType,
    target: &Arc<RecordType>,
) -> Result<(usize, usize)> {
    let owner_pk = owner.single_primary_key()?;
    let ids = distinct_keys(records.iter().map(|r| r.value(owner_pk)));
    let key_count = ids.len();
    if ids.is_empty() {
        for record in records.iter_mut() {
            record.set_many(&rel.name, Vec::new());
        }
        return Ok((0, 0));
    }

    let found = target_query(conn, types, target)
        .filter(&rel.foreign_key, Value::Array(ids))?
        .into_records()?;
    let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for child in found {
        if let Some(key) = key_of(&child, &rel.foreign_key) {
            groups.entry(key).or_default().push(child);
        }
    }

    for record in records.iter_mut() {
        let children = key_of(record, owner_pk)
            .and_then(|k| groups.get(&k).cloned())
            .unwrap_or_default();
        record.set_many(&rel.name, children);
    }
    Ok((key_count, 1))
}

/// Join table links both sides: `post_tag(post_id, tag_id)`.
fn inject_through(
    conn: &Connection,
    types: Option<&TypeRegistry>,
    records: &mut [Record],
    rel: &Relation,
    owner: &RecordType,
    target: &Arc<RecordType>,
) -> Result<(usize, usize)> {
    let Some(join) = rel.join_table.as_ref() else {
        return Err(Error::usage(
            UsageErrorKind::UnknownRelation,
            format!("many-to-many relation '{}' has no join table", rel.name),
        ));
    };
    let owner_pk = owner.single_primary_key()?;
    let ids = distinct_keys(records.iter().map(|r| r.value(owner_pk)));
    let key_count = ids.len();
    if ids.is_empty() {
        for record in records.iter_mut() {
            record.set_many(&rel.name, Vec::new());
        }
        return Ok((0, 0));
    }

    let mapping = Query::table(conn, &join.table)
        .select([join.owner_column.as_str(), join.target_column.as_str()])?
        .filter(&join.owner_column, Value::Array(ids))?
        .fetch_rows()?;

    let mut links: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut target_ids = Vec::new();
    let mut seen = BTreeSet::new();
    for row in &mapping {
        let (Some(owner_key), Some(target_key)) = (row.get(0), row.get(1)) else {
            continue;
        };
        if owner_key.is_null() || target_key.is_null() {
            continue;
        }
        links
            .entry(owner_key.to_key())
            .or_default()
            .push(target_key.to_key());
        if seen.insert(target_key.to_key()) {
            target_ids.push(target_key.clone());
        }
    }

    if target_ids.is_empty() {
        for record in records.iter_mut() {
            record.set_many(&rel.name, Vec::new());
        }
        return Ok((key_count, 1));
    }

    let target_pk = target.single_primary_key()?;
    let found = target_query(conn, types, target)
        .filter(target_pk, Value::Array(target_ids))?
        .into_records()?;
    let by_key: BTreeMap<String, Record> = found
        .into_iter()
        .filter_map(|r| key_of(&r, target_pk).map(|k| (k, r)))
        .collect();

    for record in records.iter_mut() {
        let related = key_of(record, owner_pk)
            .and_then(|k| links.get(&k))
            .map(|keys| keys.iter().filter_map(|k| by_key.get(k).cloned()).collect())
            .unwrap_or_default();
        record.set_many(&rel.name, related);
    }
    Ok((key_count, 2))
}
