//! JOIN clause types and `table.column` reference scanning.

use regex::Regex;
use sqlrecord_core::{Error, Result, UsageErrorKind};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static TABLE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*|\*)")
        .expect("valid table reference regex")
});

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    /// Parse `left`, `left outer`, `LEFT JOIN` and the like.
    pub fn parse(kind: &str) -> Result<Self> {
        let words: Vec<String> = kind
            .split_whitespace()
            .map(str::to_ascii_lowercase)
            .filter(|w| w != "join" && w != "outer")
            .collect();
        match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            [] | ["inner"] => Ok(JoinKind::Inner),
            ["left"] => Ok(JoinKind::Left),
            ["right"] => Ok(JoinKind::Right),
            ["full"] => Ok(JoinKind::Full),
            ["cross"] => Ok(JoinKind::Cross),
            _ => Err(Error::usage(
                UsageErrorKind::UnsupportedJoinType,
                format!("unsupported join type '{}'", kind),
            )),
        }
    }

    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    /// ON predicate; ignored for cross joins
    pub on: String,
}

impl Join {
    /// The name the joined table goes by in the query.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.kind.as_str(), self.table);
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
        if self.kind != JoinKind::Cross {
            sql.push_str(" ON ");
            sql.push_str(&self.on);
        }
        sql
    }
}

/// Apply `f` to the parts of `expr` outside quoted literals and quoted
/// identifiers.
fn map_unquoted(expr: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match quote {
            Some(q) if c == q => {
                out.push_str(&expr[start..=i]);
                start = i + 1;
                quote = None;
            }
            Some(_) => {}
            None if c == '\'' || c == '"' => {
                out.push_str(&f(&expr[start..i]));
                start = i;
                quote = Some(c);
            }
            None => {}
        }
    }
    match quote {
        Some(_) => out.push_str(&expr[start..]),
        None => out.push_str(&f(&expr[start..])),
    }
    out
}

/// Every `table.column` reference in `expr`, in order of appearance.
///
/// Quoted literals and quoted identifiers are skipped.
pub fn table_refs(expr: &str) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    map_unquoted(expr, |part| {
        for cap in TABLE_REF_RE.captures_iter(part) {
            let pair = (cap[1].to_string(), cap[2].to_string());
            if !refs.contains(&pair) {
                refs.push(pair);
            }
        }
        String::new()
    });
    refs
}

/// Replace table qualifiers with their aliases.
pub fn apply_aliases(expr: &str, aliases: &BTreeMap<String, String>) -> String {
    if aliases.is_empty() {
        return expr.to_string();
    }
    map_unquoted(expr, |part| {
        TABLE_REF_RE
            .replace_all(part, |cap: &regex::Captures<'_>| {
                let table = &cap[1];
                let qualifier = aliases.get(table).map_or(table, String::as_str);
                format!("{}.{}", qualifier, &cap[2])
            })
            .into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_kind_parse() {
        assert_eq!(JoinKind::parse("left").unwrap(), JoinKind::Left);
        assert_eq!(JoinKind::parse("LEFT OUTER JOIN").unwrap(), JoinKind::Left);
        assert_eq!(JoinKind::parse("join").unwrap(), JoinKind::Inner);
        assert_eq!(JoinKind::parse("Cross").unwrap(), JoinKind::Cross);
        let err = JoinKind::parse("sideways").unwrap_err();
        assert!(
            matches!(err, Error::Usage(ref e) if e.kind == UsageErrorKind::UnsupportedJoinType)
        );
    }

    #[test]
    fn test_join_to_sql() {
        let join = Join {
            kind: JoinKind::Left,
            table: "author".to_string(),
            alias: Some("a".to_string()),
            on: "post.author_id = a.id".to_string(),
        };
        assert_eq!(join.to_sql(), "LEFT JOIN author AS a ON post.author_id = a.id");
        assert_eq!(join.reference(), "a");

        let cross = Join {
            kind: JoinKind::Cross,
            alias: None,
            ..join
        };
        assert_eq!(cross.to_sql(), "CROSS JOIN author");
    }

    #[test]
    fn test_table_refs() {
        assert_eq!(
            table_refs("author.name = ? OR COUNT(comment.id) > 1"),
            vec![
                ("author".to_string(), "name".to_string()),
                ("comment".to_string(), "id".to_string())
            ]
        );
        assert!(table_refs("name = 'a.b'").is_empty());
        assert!(table_refs("price > 1.5").is_empty());
        assert_eq!(table_refs("post.*").len(), 1);
    }

    #[test]
    fn test_table_refs_skip_quoted_identifiers() {
        assert!(table_refs("\"a.b\" = 1").is_empty());
        assert_eq!(
            table_refs("\"odd.name\" = 'x.y' AND author.id = 2"),
            vec![("author".to_string(), "id".to_string())]
        );
        let aliases = BTreeMap::from([("post".to_string(), "p".to_string())]);
        assert_eq!(
            apply_aliases("\"post.title\" = post.title", &aliases),
            "\"post.title\" = p.title"
        );
    }

    #[test]
    fn test_apply_aliases() {
        let aliases = BTreeMap::from([("post".to_string(), "p".to_string())]);
        assert_eq!(
            apply_aliases("post.title = 'post.title' AND author.id = post.author_id", &aliases),
            "p.title = 'post.title' AND author.id = p.author_id"
        );
    }
}
