//! Record type descriptors.
//!
//! A [`RecordType`] describes one table: its columns, primary key, relation
//! catalog and virtual accessors. Everything is computed once when the type
//! is built and stored on the descriptor; nothing is re-derived per call.
//! Types live in a [`TypeRegistry`] arena and are looked up by table name.

use crate::error::{Error, RecordErrorKind, Result};
use crate::record::Record;
use crate::relationship::{Relation, RelationKind};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Computes a virtual field from a record.
pub type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Stores a virtual field into a record.
pub type Setter = Arc<dyn Fn(&mut Record, Value) + Send + Sync>;

/// A virtual field: either half may be absent.
#[derive(Clone, Default)]
pub struct Accessor {
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

/// Metadata for one record type.
#[derive(Debug, Clone)]
pub struct RecordType {
    table: String,
    columns: Vec<String>,
    column_types: BTreeMap<String, String>,
    primary_key: Vec<String>,
    relations: Vec<Relation>,
    relation_index: HashMap<String, usize>,
    accessors: BTreeMap<String, Accessor>,
}

impl RecordType {
    /// Start declaring a record type for `table`.
    pub fn builder(table: impl Into<String>) -> RecordTypeBuilder {
        RecordTypeBuilder::new(table)
    }

    /// A type with no declared columns or relations and an `id` key.
    pub fn bare(table: impl Into<String>) -> Self {
        Self::builder(table).build()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared columns. Empty means "whatever the table has".
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_declared_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Whether `name` is a persistable column of this type.
    ///
    /// Without declared columns every name is accepted.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c == name)
    }

    /// Explicitly declared SQL type of a column.
    pub fn declared_type(&self, column: &str) -> Option<&str> {
        self.column_types.get(column).map(String::as_str)
    }

    pub fn column_types(&self) -> &BTreeMap<String, String> {
        &self.column_types
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// The single primary-key column; composite keys are an error.
    pub fn single_primary_key(&self) -> Result<&str> {
        match self.primary_key.as_slice() {
            [pk] => Ok(pk),
            keys => Err(Error::record(
                RecordErrorKind::CompositeKey,
                format!(
                    "'{}' has a composite primary key ({})",
                    self.table,
                    keys.join(", ")
                ),
            )),
        }
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relation_index.get(name).map(|&i| &self.relations[i])
    }

    pub fn accessor(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }
}

struct RelationDecl {
    name: String,
    kind: RelationKind,
    target: Option<String>,
    foreign_key: Option<String>,
}

/// Builder for [`RecordType`].
pub struct RecordTypeBuilder {
    table: String,
    columns: Vec<String>,
    column_types: BTreeMap<String, String>,
    primary_key: Option<Vec<String>>,
    relations: Vec<RelationDecl>,
    accessors: BTreeMap<String, Accessor>,
}

impl fmt::Debug for RecordTypeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordTypeBuilder")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl RecordTypeBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into().to_lowercase(),
            columns: Vec::new(),
            column_types: BTreeMap::new(),
            primary_key: None,
            relations: Vec::new(),
            accessors: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn declared_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn declared_type(&self, column: &str) -> Option<&str> {
        self.column_types.get(column).map(String::as_str)
    }

    /// Declare persistable columns.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }

    /// Declare a column with an explicit SQL type.
    #[must_use]
    pub fn column_type(mut self, column: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column.clone());
        }
        self.column_types.insert(column, sql_type.into());
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    fn relation(mut self, name: &str, kind: RelationKind, target: Option<&str>) -> Self {
        self.relations.push(RelationDecl {
            name: name.to_string(),
            kind,
            target: target.map(str::to_string),
            foreign_key: None,
        });
        self
    }

    /// One-to-one relation; the target defaults to the singular of `name`.
    #[must_use]
    pub fn has_one(self, name: &str) -> Self {
        self.relation(name, RelationKind::OneToOne, None)
    }

    #[must_use]
    pub fn has_one_to(self, name: &str, target: &str) -> Self {
        self.relation(name, RelationKind::OneToOne, Some(target))
    }

    #[must_use]
    pub fn has_many(self, name: &str) -> Self {
        self.relation(name, RelationKind::OneToMany, None)
    }

    #[must_use]
    pub fn has_many_to(self, name: &str, target: &str) -> Self {
        self.relation(name, RelationKind::OneToMany, Some(target))
    }

    #[must_use]
    pub fn many_to_many(self, name: &str) -> Self {
        self.relation(name, RelationKind::ManyToMany, None)
    }

    #[must_use]
    pub fn many_to_many_to(self, name: &str, target: &str) -> Self {
        self.relation(name, RelationKind::ManyToMany, Some(target))
    }

    /// Override the foreign-key column of an already declared relation.
    #[must_use]
    pub fn foreign_key(mut self, relation: &str, column: &str) -> Self {
        if let Some(decl) = self.relations.iter_mut().rev().find(|d| d.name == relation) {
            decl.foreign_key = Some(column.to_string());
        }
        self
    }

    /// Register a virtual field.
    #[must_use]
    pub fn accessor(
        mut self,
        name: &str,
        getter: Option<Getter>,
        setter: Option<Setter>,
    ) -> Self {
        self.accessors
            .insert(name.to_string(), Accessor { getter, setter });
        self
    }

    /// Convenience for a read-only virtual field.
    #[must_use]
    pub fn getter<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.accessor(name, Some(Arc::new(f)), None)
    }

    pub fn build(self) -> RecordType {
        let primary_key = self
            .primary_key
            .filter(|pk| !pk.is_empty())
            .unwrap_or_else(|| vec!["id".to_string()]);

        let mut relations = Vec::with_capacity(self.relations.len());
        let mut relation_index = HashMap::with_capacity(self.relations.len());
        for decl in self.relations {
            let relation = Relation::resolve(
                &self.table,
                &decl.name,
                decl.kind,
                decl.target.as_deref(),
                decl.foreign_key.as_deref(),
            );
            match relation_index.get(&relation.name) {
                Some(&i) => relations[i] = relation,
                None => {
                    relation_index.insert(relation.name.clone(), relations.len());
                    relations.push(relation);
                }
            }
        }

        let mut columns = self.columns;
        if !columns.is_empty() {
            for pk in primary_key.iter().rev() {
                if !columns.contains(pk) {
                    columns.insert(0, pk.clone());
                }
            }
            for relation in &relations {
                if relation.kind == RelationKind::OneToOne && !columns.contains(&relation.foreign_key)
                {
                    columns.push(relation.foreign_key.clone());
                }
            }
        }

        RecordType {
            table: self.table,
            columns,
            column_types: self.column_types,
            primary_key,
            relations,
            relation_index,
            accessors: self.accessors,
        }
    }
}

/// Arena of record types, indexed by table name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<TypeArena>,
}

#[derive(Debug, Default)]
struct TypeArena {
    types: Vec<Arc<RecordType>>,
    index: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type; a type registered again under the same table replaces
    /// the earlier entry.
    pub fn register(&self, ty: RecordType) -> Arc<RecordType> {
        let ty = Arc::new(ty);
        let mut arena = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match arena.index.get(ty.table()).copied() {
            Some(i) => arena.types[i] = Arc::clone(&ty),
            None => {
                let i = arena.types.len();
                arena.index.insert(ty.table().to_string(), i);
                arena.types.push(Arc::clone(&ty));
            }
        }
        tracing::debug!(
            table = ty.table(),
            relations = ty.relations().len(),
            "Registered record type"
        );
        ty
    }

    pub fn get(&self, table: &str) -> Option<Arc<RecordType>> {
        let arena = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        arena.index.get(table).map(|&i| Arc::clone(&arena.types[i]))
    }

    /// Look up a type, failing with `UnknownType` when it was never
    /// registered.
    pub fn require(&self, table: &str) -> Result<Arc<RecordType>> {
        self.get(table).ok_or_else(|| {
            Error::record(
                RecordErrorKind::UnknownType,
                format!("record type '{}' is not registered", table),
            )
        })
    }

    /// Look up a type, falling back to a bare descriptor for unregistered
    /// tables.
    pub fn resolve(&self, table: &str) -> Arc<RecordType> {
        self.get(table)
            .unwrap_or_else(|| Arc::new(RecordType::bare(table)))
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .types
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tables(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .types
            .iter()
            .map(|t| t.table().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_type() -> RecordType {
        RecordType::builder("post")
            .columns(["title", "body"])
            .has_one("author")
            .has_many("comments")
            .many_to_many("tags")
            .build()
    }

    #[test]
    fn test_build_defaults() {
        let ty = post_type();
        assert_eq!(ty.table(), "post");
        assert_eq!(ty.primary_key(), ["id".to_string()]);
        assert_eq!(ty.single_primary_key().unwrap(), "id");
        assert_eq!(ty.columns(), ["id", "title", "body", "author_id"]);
        assert!(ty.has_column("author_id"));
        assert!(!ty.has_column("author_name"));
    }

    #[test]
    fn test_relation_catalog() {
        let ty = post_type();
        assert_eq!(ty.relations().len(), 3);
        assert_eq!(ty.relation("comments").unwrap().foreign_key, "post_id");
        assert_eq!(
            ty.relation("tags").unwrap().join_table.as_ref().unwrap().table,
            "post_tag"
        );
        assert!(ty.relation("nope").is_none());
    }

    #[test]
    fn test_composite_key() {
        let ty = RecordType::builder("post_tag")
            .primary_key(["post_id", "tag_id"])
            .build();
        let err = ty.single_primary_key().unwrap_err();
        match err {
            Error::Record(e) => assert_eq!(e.kind, RecordErrorKind::CompositeKey),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_foreign_key_override() {
        let ty = RecordType::builder("post")
            .has_one_to("writer", "user")
            .foreign_key("writer", "written_by")
            .build();
        let rel = ty.relation("writer").unwrap();
        assert_eq!(rel.target, "user");
        assert_eq!(rel.foreign_key, "written_by");
    }

    #[test]
    fn test_registry() {
        let registry = TypeRegistry::new();
        registry.register(post_type());
        registry.register(RecordType::bare("author"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tables(), vec!["post", "author"]);
        assert!(registry.get("post").is_some());
        assert!(registry.require("tag").is_err());
        assert_eq!(registry.resolve("tag").table(), "tag");

        registry.register(RecordType::builder("post").columns(["x"]).build());
        assert_eq!(registry.len(), 2);
        assert!(registry.get("post").unwrap().has_column("x"));
    }
}
