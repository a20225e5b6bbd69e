//! Named statement parameters.

use crate::value::Value;
use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^:A-Za-z0-9_]):([A-Za-z_][A-Za-z0-9_]*)").expect("valid placeholder regex")
});

/// An ordered map of named parameters.
///
/// Names are stored without the leading colon. Placeholders allocated through
/// [`Params::bind`] are numbered `:p0`, `:p1`, ... in allocation order and
/// never collide within one map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
    next: usize,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next numbered placeholder for `value`.
    ///
    /// Returns the placeholder token including the colon, ready to be
    /// spliced into SQL text.
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        let value = value.into();
        loop {
            let name = format!("p{}", self.next);
            self.next += 1;
            if !self.contains(&name) {
                self.entries.push((name.clone(), value));
                return format!(":{}", name);
            }
        }
    }

    /// Insert or replace a parameter by name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let name = name.strip_prefix(':').map_or(name.clone(), str::to_string);
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`Params::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Named placeholders referenced by `sql`, in order of appearance, without
/// the colon.
///
/// `::type` casts are not placeholders. Quoted literals are not skipped, so
/// this is meant for SQL the builder generated itself.
pub fn placeholder_names(sql: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(sql)
        .filter_map(|caps| caps.get(2).map(|m| m.as_str().to_string()))
        .collect()
}
