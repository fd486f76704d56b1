//! Startup sequence: config → File Cache/Token Verifier/Policy Engine
//! Host (fail fast, per the error-handling design's fatal conditions) →
//! in-memory Object Store → server-operator organization provisioning →
//! Notification Manager → wired `AppState`.
//!
//! Grounded on the teacher's `ServerBuilder`/`build_app` staging in
//! `server.rs`: construct collaborators in dependency order, abort with
//! `anyhow::Context` on any failure rather than limping into a degraded
//! `serve()` call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;

use tmf_core::id as id_mint;
use tmf_notifications::{Notifier, SubscriptionRegistry};
use tmf_policy::{FileCache, PolicyEngineHost, TokenVerifier};
use tmf_storage::{InMemoryObjectStore, TMFObject};

use crate::config::ServerConfig;
use crate::state::AppState;

pub async fn build_state(config: &ServerConfig) -> Result<AppState, anyhow::Error> {
    let file_cache = Arc::new(FileCache::with_freshness(
        Duration::from_secs(config.file_cache.local_restat_secs),
        Duration::from_secs(config.file_cache.remote_default_ttl_secs),
    ));

    let policy = Arc::new(PolicyEngineHost::new(config.policy.source.clone(), file_cache));
    policy
        .warm_up()
        .await
        .with_context(|| format!("policy source {:?} failed to load and compile", config.policy.source))?;

    let verifier = Arc::new(TokenVerifier::new(config.verifier.discovery_url.clone()));
    verifier
        .warm_up()
        .await
        .with_context(|| format!("OIDC verifier at {:?} is unreachable at startup", config.verifier.discovery_url))?;

    let store: Arc<dyn tmf_storage::ObjectStore> = Arc::new(InMemoryObjectStore::new());
    provision_operator_organization(&store, &config.operator.did)
        .await
        .context("failed to provision the server-operator organization record")?;

    let registry = Arc::new(SubscriptionRegistry::new());
    let notifier = Notifier::with_timeout(registry, config.notifications.timeout());

    Ok(AppState {
        store,
        policy,
        verifier,
        notifier,
        operator_did: Arc::from(config.operator.did.as_str()),
    })
}

async fn provision_operator_organization(store: &Arc<dyn tmf_storage::ObjectStore>, operator_did: &str) -> Result<(), anyhow::Error> {
    let id = id_mint::organization_id(operator_did);
    let content = json!({
        "id": id,
        "@type": "organization",
        "href": format!("/tmf-api/TMF632/v5/organization/{id}"),
        "version": "1.0",
        "tradingName": operator_did,
        "lastUpdate": tmf_core::time::to_rfc3339_nanos(tmf_core::time::now()),
    });
    let obj = TMFObject::new(id, "organization", "1.0", content);
    match store.create(obj).await {
        Ok(()) => Ok(()),
        Err(tmf_storage::StorageError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
