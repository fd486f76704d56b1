//! File Cache, OIDC Token Verifier, and the sandboxed Policy Engine Host.
//!
//! These three collaborate but are independently usable: the pipeline
//! wires a [`file_cache::FileCache`] into a [`pool::PolicyEngineHost`] for
//! policy source loading, and a [`token_verifier::TokenVerifier`]
//! separately for bearer-token verification.

pub mod engine;
pub mod error;
pub mod file_cache;
pub mod pool;
pub mod token_verifier;

pub use error::{FileCacheError, PolicyError, TokenError};
pub use file_cache::FileCache;
pub use pool::PolicyEngineHost;
pub use token_verifier::{CallerIdentity, TokenVerifier};
