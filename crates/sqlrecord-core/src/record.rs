//! Active records.
//!
//! A [`Record`] is a field map plus the snapshot it was loaded with and a
//! cache of resolved relations. The snapshot only moves forward after a
//! successful persist, which is what lets updates send just the changed
//! columns.

use crate::error::{Error, RecordErrorKind, Result};
use crate::model::RecordType;
use crate::row::Row;
use crate::value::Value;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved relation held in a record's cache.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl Related {
    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the cached records.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
        match self {
            Related::One(one) => Box::new(one.iter().map(|r| &**r)),
            Related::Many(many) => Box::new(many.iter()),
        }
    }
}

/// Result of a field lookup on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<'a> {
    /// A raw field or a virtual accessor's value
    Value(Value),
    /// A cached one-to-one relation
    One(&'a Record),
    /// A cached collection relation
    Many(&'a [Record]),
    /// Nothing by that name, or an empty relation
    Null,
}

impl<'a> Field<'a> {
    pub fn is_null(&self) -> bool {
        match self {
            Field::Null => true,
            Field::Value(v) => v.is_null(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Field::Value(v) => v,
            _ => Value::Null,
        }
    }

    pub fn as_one(&self) -> Option<&'a Record> {
        match self {
            Field::One(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&'a [Record]> {
        match self {
            Field::Many(r) => Some(r),
            _ => None,
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ty.table() == other.ty.table() && self.fields == other.fields
    }
}

/// One row of a table, mapped to a field map.
#[derive(Debug, Clone)]
pub struct Record {
    ty: Arc<RecordType>,
    fields: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    relations: BTreeMap<String, Related>,
}

impl Record {
    /// A new, unsaved record.
    pub fn new(ty: Arc<RecordType>) -> Self {
        Self {
            ty,
            fields: BTreeMap::new(),
            original: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// A record loaded from storage; the snapshot equals the fields.
    pub fn loaded(ty: Arc<RecordType>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            ty,
            original: fields.clone(),
            fields,
            relations: BTreeMap::new(),
        }
    }

    pub fn from_row(ty: Arc<RecordType>, row: Row) -> Self {
        Self::loaded(ty, row.into_map())
    }

    /// Builder-style [`Record::set`].
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.ty
    }

    pub fn table(&self) -> &str {
        self.ty.table()
    }

    /// Look a name up: virtual accessor, then raw field, then cached
    /// relation. Unknown names give [`Field::Null`].
    pub fn get(&self, name: &str) -> Field<'_> {
        if let Some(getter) = self.ty.accessor(name).and_then(|a| a.getter.as_ref()) {
            return Field::Value(getter(self));
        }
        if let Some(value) = self.fields.get(name) {
            return Field::Value(value.clone());
        }
        match self.relations.get(name) {
            Some(Related::One(Some(one))) => Field::One(one),
            Some(Related::Many(many)) => Field::Many(many),
            Some(Related::One(None)) | None => Field::Null,
        }
    }

    /// Assign a field, going through a virtual setter when one exists.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let setter = self
            .ty
            .accessor(name)
            .and_then(|a| a.setter.as_ref())
            .map(Arc::clone);
        match setter {
            Some(setter) => setter(self, value),
            None => self.set_raw(name, value),
        }
    }

    /// Assign a raw field, bypassing virtual setters.
    pub fn set_raw(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Raw field value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn original(&self) -> &BTreeMap<String, Value> {
        &self.original
    }

    /// Fields whose value differs from the snapshot.
    pub fn changes(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|(k, v)| self.original.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.fields
            .iter()
            .any(|(k, v)| self.original.get(k) != Some(v))
    }

    /// Move the snapshot forward to the current fields.
    ///
    /// Call only after the fields were persisted.
    pub fn mark_persisted(&mut self) {
        self.original = self.fields.clone();
    }

    /// The single primary-key value.
    ///
    /// Fails for composite keys and for records without an identity.
    pub fn id(&self) -> Result<Value> {
        let pk = self.ty.single_primary_key()?;
        match self.fields.get(pk) {
            Some(v) if !v.is_null() => Ok(v.clone()),
            _ => Err(Error::record(
                RecordErrorKind::MissingIdentity,
                format!("{} record has no '{}' yet", self.ty.table(), pk),
            )),
        }
    }

    /// Whether every primary-key column holds a value.
    pub fn exists(&self) -> bool {
        self.ty
            .primary_key()
            .iter()
            .all(|pk| self.fields.get(pk).is_some_and(|v| !v.is_null()))
    }

    /// Drop the identity, e.g. after the row was deleted.
    pub fn clear_id(&mut self) {
        for pk in self.ty.primary_key() {
            self.fields.remove(pk);
            self.original.remove(pk);
        }
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn related_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn set_one(&mut self, name: &str, record: Option<Record>) {
        self.relations
            .insert(name.to_string(), Related::One(record.map(Box::new)));
    }

    pub fn set_many(&mut self, name: &str, records: Vec<Record>) {
        self.relations
            .insert(name.to_string(), Related::Many(records));
    }

    pub fn take_related(&mut self, name: &str) -> Option<Related> {
        self.relations.remove(name)
    }

    /// Put back a cache entry taken with [`Record::take_related`].
    pub fn restore_related(&mut self, name: &str, related: Related) {
        self.relations.insert(name.to_string(), related);
    }

    pub fn loaded_relations(&self) -> impl Iterator<Item = (&str, &Related)> {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// JSON view: fields plus loaded relations.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.to_json());
        }
        for (name, related) in &self.relations {
            let value = match related {
                Related::One(Some(one)) => one.to_json(),
                Related::One(None) => serde_json::Value::Null,
                Related::Many(many) => {
                    serde_json::Value::Array(many.iter().map(Record::to_json).collect())
                }
            };
            map.insert(name.clone(), value);
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordType;

    fn user_type() -> Arc<RecordType> {
        Arc::new(
            RecordType::builder("user")
                .columns(["first", "last", "age"])
                .getter("full_name", |r| {
                    let first = r.value("first").and_then(Value::as_str).unwrap_or("");
                    let last = r.value("last").and_then(Value::as_str).unwrap_or("");
                    Value::from(format!("{} {}", first, last))
                })
                .accessor(
                    "initials",
                    None,
                    Some(Arc::new(|r: &mut Record, v: Value| {
                        r.set_raw("initials_upper", v.as_str().unwrap_or("").to_uppercase());
                    })),
                )
                .has_many("posts")
                .build(),
        )
    }

    fn loaded() -> Record {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::Int(1));
        fields.insert("first".to_string(), Value::from("Ada"));
        fields.insert("last".to_string(), Value::from("Lovelace"));
        fields.insert("age".to_string(), Value::Int(36));
        Record::loaded(user_type(), fields)
    }

    #[test]
    fn test_field_access_order() {
        let mut user = loaded();
        assert_eq!(user.get("full_name").into_value(), Value::from("Ada Lovelace"));
        assert_eq!(user.get("age").into_value(), Value::Int(36));
        assert_eq!(user.get("nothing"), Field::Null);
        assert!(user.get("posts").is_null());

        user.set_many("posts", vec![Record::new(Arc::new(RecordType::bare("post")))]);
        assert_eq!(user.get("posts").as_many().unwrap().len(), 1);
    }

    #[test]
    fn test_virtual_setter() {
        let mut user = loaded();
        user.set("initials", "al");
        assert_eq!(user.value("initials_upper"), Some(&Value::from("AL")));
        assert!(user.value("initials").is_none());
    }

    #[test]
    fn test_diff_tracks_only_changes() {
        let mut user = loaded();
        assert!(!user.is_dirty());
        user.set("age", 37);
        let changes = user.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("age"), Some(&Value::Int(37)));
        assert_eq!(user.original().get("age"), Some(&Value::Int(36)));

        user.mark_persisted();
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_identity() {
        let user = loaded();
        assert!(user.exists());
        assert_eq!(user.id().unwrap(), Value::Int(1));

        let fresh = Record::new(user_type());
        assert!(!fresh.exists());
        match fresh.id().unwrap_err() {
            Error::Record(e) => assert_eq!(e.kind, RecordErrorKind::MissingIdentity),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_to_json_includes_relations() {
        let mut user = loaded();
        let post = Record::new(Arc::new(RecordType::bare("post"))).with("title", "Notes");
        user.set_many("posts", vec![post]);
        let json = user.to_json();
        assert_eq!(json["first"], "Ada");
        assert_eq!(json["posts"][0]["title"], "Notes");
        assert_eq!(serde_json::to_value(&user).unwrap(), json);
    }
}
