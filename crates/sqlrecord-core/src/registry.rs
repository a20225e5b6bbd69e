//! Named connections.

use crate::connection::Connection;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Name under which the first registered connection is also stored.
pub const DEFAULT_CONNECTION: &str = "default";

/// A set of named connections, passed explicitly to whoever needs them.
///
/// The first connection registered is also reachable as `"default"`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<BTreeMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, conn: Arc<Connection>) {
        let name = name.into();
        let mut map = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if map.is_empty() && name != DEFAULT_CONNECTION {
            map.insert(DEFAULT_CONNECTION.to_string(), Arc::clone(&conn));
        }
        tracing::debug!(name = %name, dsn = %conn.params().to_dsn(), "Registered connection");
        map.insert(name, conn);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn default_connection(&self) -> Option<Arc<Connection>> {
        self.get(DEFAULT_CONNECTION)
    }

    pub fn names(&self) -> Vec<String> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
