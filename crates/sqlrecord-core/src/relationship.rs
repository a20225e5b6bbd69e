//! Relation metadata.
//!
//! Relations are declared on a [`RecordType`](crate::RecordType) by name and
//! kind. Target types, foreign-key columns and join tables are derived from
//! naming conventions when the declaration does not override them:
//!
//! | Kind | Foreign key | Lives on |
//! |---|---|---|
//! | one-to-one | `<relation>_id` | owner |
//! | one-to-many | `<owner_table>_id` | target |
//! | many-to-many | `<owner>_id`, `<target>_id` | join table `lesser_greater` |

use std::fmt;

/// The kind of association between two record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The owner carries a foreign key to one target: `post.author_id`.
    OneToOne,
    /// Each target carries a foreign key back to the owner: `comment.post_id`.
    OneToMany,
    /// Owner and target are linked through a join table.
    ManyToMany,
}

impl RelationKind {
    /// Whether resolving this relation yields a sequence of records.
    pub const fn is_collection(&self) -> bool {
        !matches!(self, RelationKind::OneToOne)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "one-to-one",
            RelationKind::OneToMany => "one-to-many",
            RelationKind::ManyToMany => "many-to-many",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Column pointing at the owner's primary key, e.g. `post_id`
    pub owner_column: String,
    /// Column pointing at the target's primary key, e.g. `tag_id`
    pub target_column: String,
}

impl JoinTable {
    /// Conventional join table between `owner` and `target`.
    pub fn between(owner: &str, target: &str) -> Self {
        let target_column = if owner == target {
            format!("related_{}_id", target)
        } else {
            foreign_key_for(target)
        };
        Self {
            table: join_table_name(owner, target),
            owner_column: foreign_key_for(owner),
            target_column,
        }
    }
}

/// A resolved relation. Immutable once its record type is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    /// Target record type (its table name)
    pub target: String,
    /// Foreign-key column; on the owner for one-to-one, on the target for
    /// one-to-many, the owner column of the join table for many-to-many
    pub foreign_key: String,
    pub join_table: Option<JoinTable>,
}

impl Relation {
    /// Resolve a declaration against its owner's table using the naming
    /// conventions.
    pub fn resolve(
        owner: &str,
        name: &str,
        kind: RelationKind,
        target: Option<&str>,
        foreign_key: Option<&str>,
    ) -> Self {
        let target = target.map_or_else(|| singularize(name), str::to_lowercase);
        match kind {
            RelationKind::OneToOne => Self {
                name: name.to_string(),
                kind,
                foreign_key: foreign_key.map_or_else(|| foreign_key_for(name), str::to_string),
                target,
                join_table: None,
            },
            RelationKind::OneToMany => Self {
                name: name.to_string(),
                kind,
                foreign_key: foreign_key.map_or_else(|| foreign_key_for(owner), str::to_string),
                target,
                join_table: None,
            },
            RelationKind::ManyToMany => {
                let mut join = JoinTable::between(owner, &target);
                if let Some(fk) = foreign_key {
                    join.owner_column = fk.to_string();
                }
                Self {
                    name: name.to_string(),
                    kind,
                    foreign_key: join.owner_column.clone(),
                    target,
                    join_table: Some(join),
                }
            }
        }
    }
}

/// `<table>_id`
pub fn foreign_key_for(table: &str) -> String {
    format!("{}_id", table.to_lowercase())
}

/// Join table name: the two tables in lexicographic order joined by `_`.
pub fn join_table_name(a: &str, b: &str) -> String {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

/// Lower-cased English singular of a relation name.
///
/// Covers the regular plurals relation names use in practice; irregular
/// nouns need an explicit target.
pub fn singularize(word: &str) -> String {
    let word = word.to_lowercase();
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "ches", "shes", "xes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word
}
