//! Core error taxonomy shared by every layer of the object server.
//!
//! Mirrors the HTTP status taxonomy of the error-handling design: each
//! variant knows whether it is a client or a server error, so the HTTP
//! layer only has to ask the error, never re-derive the mapping.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("invalid resource id: {0}")]
    InvalidId(String),

    #[error("`@type` {found:?} does not match resource {expected:?}")]
    TypeMismatch { expected: String, found: String },

    #[error("version {incoming:?} is not greater than current latest {current:?}")]
    VersionNotAdvancing { current: String, incoming: String },

    #[error("invalid query parameter {name}: {reason}")]
    InvalidQueryParam { name: String, reason: String },

    #[error("missing or invalid bearer token")]
    Unauthenticated,

    #[error("policy denied the request{0}")]
    PolicyDenied(PolicyDenialReason),

    #[error("resource {resource_type}/{id} not found")]
    NotFound { resource_type: String, id: String },

    #[error("resource {resource_type}/{id} already exists")]
    AlreadyExists { resource_type: String, id: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("policy engine unavailable: {0}")]
    PolicyUnavailable(String),

    #[error("upstream dependency failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Time(#[from] time::error::Format),
}

/// Why a policy check failed to produce an allow — carried for logging,
/// never shown verbatim to the caller beyond a generic 403.
#[derive(Debug, Default)]
pub struct PolicyDenialReason(pub String);

impl std::fmt::Display for PolicyDenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, ": {}", self.0)
        }
    }
}

impl CoreError {
    pub fn policy_denied(reason: impl Into<String>) -> Self {
        CoreError::PolicyDenied(PolicyDenialReason(reason.into()))
    }

    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::AlreadyExists {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// HTTP status this error maps to, per the error-handling design's taxonomy.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::MalformedBody(_)
            | CoreError::InvalidId(_)
            | CoreError::TypeMismatch { .. }
            | CoreError::VersionNotAdvancing { .. }
            | CoreError::InvalidQueryParam { .. } => 400,
            CoreError::Unauthenticated => 401,
            CoreError::PolicyDenied(_) => 403,
            CoreError::NotFound { .. } => 404,
            CoreError::AlreadyExists { .. } => 409,
            CoreError::Storage(_)
            | CoreError::PolicyUnavailable(_)
            | CoreError::Upstream(_)
            | CoreError::Json(_)
            | CoreError::Time(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Short machine-readable reason code used in the error envelope.
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::MalformedBody(_) => "malformedBody",
            CoreError::InvalidId(_) => "invalidId",
            CoreError::TypeMismatch { .. } => "typeMismatch",
            CoreError::VersionNotAdvancing { .. } => "versionNotAdvancing",
            CoreError::InvalidQueryParam { .. } => "invalidQueryParam",
            CoreError::Unauthenticated => "unauthenticated",
            CoreError::PolicyDenied(_) => "policyDenied",
            CoreError::NotFound { .. } => "notFound",
            CoreError::AlreadyExists { .. } => "alreadyExists",
            CoreError::Storage(_) => "storageFailure",
            CoreError::PolicyUnavailable(_) => "policyUnavailable",
            CoreError::Upstream(_) => "upstreamFailure",
            CoreError::Json(_) => "marshallingFailure",
            CoreError::Time(_) => "marshallingFailure",
        }
    }
}
