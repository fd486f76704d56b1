//! In-memory `ObjectStore`. Reference backend: not durable, intended as
//! the default implementation and for tests.
//!
//! Keyed by `(id, type)` -> `BTreeMap<version, TMFObject>` so that both
//! "fetch latest" (last entry) and "fetch a specific version" are O(log n),
//! and a `dashmap::DashMap` at the outer level gives lock-free concurrent
//! access across distinct ids while still serializing same-id read-merge-write
//! sequences behind that one shard's internal lock.

use dashmap::DashMap;

use crate::error::StorageError;
use crate::traits::ObjectStore;
use crate::types::{ListQuery, ListResult, SortDirection, TMFObject};
use async_trait::async_trait;

type Key = (String, String);

#[derive(Default)]
pub struct InMemoryObjectStore {
    rows: DashMap<Key, std::collections::BTreeMap<String, TMFObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(id: &str, resource_type: &str) -> Key {
        (resource_type.to_string(), id.to_string())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn create(&self, obj: TMFObject) -> Result<(), StorageError> {
        let key = Self::key(&obj.id, &obj.resource_type);
        let mut entry = self.rows.entry(key).or_default();
        if !entry.is_empty() {
            // A row for this id already exists: the (id, type) identity is
            // taken, matching the spec's "create" contract (one logical
            // object per id, not per (id,version)).
            return Err(StorageError::AlreadyExists {
                resource_type: obj.resource_type,
                id: obj.id,
            });
        }
        entry.insert(obj.version.clone(), obj);
        Ok(())
    }

    async fn get_latest(&self, id: &str, resource_type: &str) -> Result<Option<TMFObject>, StorageError> {
        let key = Self::key(id, resource_type);
        Ok(self
            .rows
            .get(&key)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn update(&self, obj: TMFObject) -> Result<(), StorageError> {
        let key = Self::key(&obj.id, &obj.resource_type);
        let mut entry = self.rows.get_mut(&key).ok_or_else(|| StorageError::NotFound {
            resource_type: obj.resource_type.clone(),
            id: obj.id.clone(),
        })?;
        let current = entry
            .values()
            .next_back()
            .map(|o| o.version.clone())
            .unwrap_or_default();
        if obj.version.as_str() <= current.as_str() {
            return Err(StorageError::Conflict {
                resource_type: obj.resource_type,
                id: obj.id,
                current,
                incoming: obj.version,
            });
        }
        entry.insert(obj.version.clone(), obj);
        Ok(())
    }

    async fn delete(&self, id: &str, resource_type: &str) -> Result<(), StorageError> {
        let key = Self::key(id, resource_type);
        self.rows.remove(&key);
        Ok(())
    }

    async fn list(&self, resource_type: &str, query: &ListQuery) -> Result<ListResult, StorageError> {
        let mut latest: Vec<TMFObject> = self
            .rows
            .iter()
            .filter(|entry| entry.key().0 == resource_type)
            .filter_map(|entry| entry.value().values().next_back().cloned())
            .collect();

        latest.retain(|obj| {
            query
                .filters
                .iter()
                .all(|(field, expected)| content_field_eq(&obj.content, field, expected))
        });

        let total_count = latest.len();

        for spec in query.sort.iter().rev() {
            latest.sort_by(|a, b| {
                let av = a.content.get(&spec.field);
                let bv = b.content.get(&spec.field);
                let ord = compare_json(av, bv);
                match spec.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            });
        }

        let offset = query.offset.min(latest.len());
        let end = match query.limit {
            Some(limit) => (offset + limit).min(latest.len()),
            None => latest.len(),
        };
        let items = latest[offset..end].to_vec();

        Ok(ListResult { items, total_count })
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

fn content_field_eq(content: &serde_json::Value, field: &str, expected: &str) -> bool {
    match content.get(field) {
        Some(serde_json::Value::String(s)) => s == expected,
        Some(other) => other.to_string().trim_matches('"') == expected,
        None => false,
    }
}

fn compare_json(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> std::cmp::Ordering {
    let a = a.map(render_sort_key).unwrap_or_default();
    let b = b.map(render_sort_key).unwrap_or_default();
    a.cmp(&b)
}

fn render_sort_key(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
