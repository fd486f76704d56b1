//! The narrow Object Store interface. Any backend that can compute a
//! latest-per-id projection and content-field equality is acceptable;
//! this crate ships one in-memory implementation (see [`crate::memory`]).

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{ListQuery, ListResult, TMFObject};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Inserts a brand new `(id, type, version)` row.
    async fn create(&self, obj: TMFObject) -> Result<(), StorageError>;

    /// Returns the row with the lexicographically greatest `version` for
    /// `(id, type)`, or `None` if the id has no rows at all.
    async fn get_latest(&self, id: &str, resource_type: &str) -> Result<Option<TMFObject>, StorageError>;

    /// Inserts a new version row for an id that must already exist.
    /// Callers are expected to have already validated the monotonic
    /// version rule; this method still re-validates it to guard against
    /// races between concurrent updates (see the concurrency model).
    async fn update(&self, obj: TMFObject) -> Result<(), StorageError>;

    /// Deletes every row for `(id, type)`. Idempotent: deleting an id with
    /// no rows is not an error.
    async fn delete(&self, id: &str, resource_type: &str) -> Result<(), StorageError>;

    /// Latest-version projection over all ids of `resource_type`, after
    /// applying `query`'s filters/sort/pagination.
    async fn list(&self, resource_type: &str, query: &ListQuery) -> Result<ListResult, StorageError>;

    fn backend_name(&self) -> &'static str;
}
