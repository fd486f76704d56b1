use thiserror::Error;

/// Outcomes of the store's narrow capability set, explicit at the type
/// boundary rather than hidden behind a generic failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{resource_type}/{id} already exists")]
    AlreadyExists { resource_type: String, id: String },

    #[error("{resource_type}/{id} not found")]
    NotFound { resource_type: String, id: String },

    #[error("version conflict on {resource_type}/{id}: current {current}, incoming {incoming}")]
    Conflict {
        resource_type: String,
        id: String,
        current: String,
        incoming: String,
    },

    #[error("backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, StorageError::Backend(_))
    }
}
