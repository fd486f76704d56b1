//! Shared application state, handed to every handler through axum's
//! `State` extractor — the same shape the teacher's `server::AppState`
//! plays, scaled down to the handful of collaborators this surface needs.

use std::sync::Arc;

use tmf_notifications::Notifier;
use tmf_policy::{PolicyEngineHost, TokenVerifier};
use tmf_storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub policy: Arc<PolicyEngineHost>,
    pub verifier: Arc<TokenVerifier>,
    pub notifier: Notifier,
    /// `did:elsi:<...>` identity injected as `SellerOperator` on every object.
    pub operator_did: Arc<str>,
}
