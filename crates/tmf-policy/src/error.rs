use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FileCacheError {
    #[error("source {0} has never been fetched successfully")]
    NotFound(String),

    #[error("source {0} exceeds the 1 MiB size limit")]
    TooLarge(String),

    #[error("fetch of {source} failed: {reason}")]
    Fetch { source: String, reason: String },
}

#[derive(Debug, Error, Clone)]
pub enum PolicyError {
    #[error("policy engine unavailable: {0}")]
    Unavailable(String),

    #[error("policy denied the request")]
    Denied,

    #[error("policy script error: {0}")]
    ScriptError(String),

    #[error(transparent)]
    FileCache(#[from] FileCacheError),
}

#[derive(Debug, Error, Clone)]
pub enum TokenError {
    #[error("missing or malformed bearer token")]
    Missing,

    #[error("signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("discovery document fetch failed: {0}")]
    Discovery(String),

    #[error("jwks fetch failed: {0}")]
    Jwks(String),

    #[error("no signing keys found in jwks")]
    NoSigningKeys,
}
