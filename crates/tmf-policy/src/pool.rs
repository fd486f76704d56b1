//! The Policy Engine Host: a checkout pool of [`PolicyInstance`]s sitting
//! in front of the Rhai runtime in `engine.rs`, with file-cache-backed hot
//! reload on every checkout.
//!
//! Deliberately NOT grounded on the teacher's `PolicyReloadService`
//! (`octofhir-auth/src/policy/reload.rs`): that service pushes recompiles
//! via a debounced `tokio::sync::broadcast` watching a filesystem
//! notifier. This host is pull-based per the component design — every
//! `authorize()` call compares the checked-out instance's `scriptHash`
//! against the File Cache's current hash and recompiles in place if they
//! differ — so no background task and no `notify`/`notify-debouncer-mini`
//! dependency is needed.

use std::sync::Arc;

use rhai::{Engine, AST};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::engine;
use crate::error::PolicyError;
use crate::file_cache::FileCache;

/// One compiled script instance. Non-reentrant: the pool hands out at
/// most one concurrent holder per instance (see [`PolicyEngineHost`]).
struct PolicyInstance {
    ast: AST,
    script_hash: u64,
}

/// Owns the checkout pool and the single source of truth for which
/// script source backs it. `authorize()` is the only operation the
/// pipeline needs; checkout/recompile/return all happen inside that one
/// call so callers never see a `PolicyInstance` directly.
pub struct PolicyEngineHost {
    source: String,
    file_cache: Arc<FileCache>,
    engine: Arc<Engine>,
    pool: Mutex<Vec<PolicyInstance>>,
}

impl PolicyEngineHost {
    pub fn new(source: impl Into<String>, file_cache: Arc<FileCache>) -> Self {
        Self {
            source: source.into(),
            file_cache,
            engine: Arc::new(engine::build_engine()),
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Forces a first compile-and-call of the policy source, so a missing,
    /// malformed, or `authorize`-less policy aborts startup (per §7's
    /// fatal conditions) instead of surfacing as a 500/403 on the first
    /// real request. The trial call's boolean result is discarded; only
    /// whether it could be made at all matters here.
    pub async fn warm_up(&self) -> Result<(), PolicyError> {
        let instance = self.checkout().await?;
        let trial = engine::authorize(&self.engine, &instance.ast, &Value::Object(Default::default()));
        self.pool.lock().await.push(instance);
        trial.map(|_| ())
    }

    /// Evaluates `authorize(input)` against the current policy. Any
    /// script runtime error or non-boolean return is a deny at the
    /// pipeline layer, not here — this returns the `Err` so the caller
    /// decides (and the pipeline always maps it to 403, per §4.3's
    /// failure semantics).
    pub async fn authorize(&self, input: &Value) -> Result<bool, PolicyError> {
        let instance = self.checkout().await?;
        let result = engine::authorize(&self.engine, &instance.ast, input);
        self.pool.lock().await.push(instance);
        result
    }

    /// Checkout is non-blocking if an instance already compiled against
    /// the current source hash is idle in the pool. Otherwise an idle
    /// instance (if any) is recompiled in place, or — if the pool is
    /// empty — a fresh instance is constructed. Either way the File
    /// Cache's own freshness window (not this call) decides how often a
    /// real re-fetch happens; `authorize` calls in quick succession after
    /// a reload all pay at most one recompile.
    async fn checkout(&self) -> Result<PolicyInstance, PolicyError> {
        let entry = self.file_cache.get(&self.source).await?;

        {
            let mut pool = self.pool.lock().await;
            if let Some(pos) = pool.iter().position(|i| i.script_hash == entry.content_hash) {
                return Ok(pool.swap_remove(pos));
            }
            // No idle instance matches the current hash: drop one stale
            // instance (if any) to make room rather than letting the pool
            // grow unbounded across repeated reloads.
            pool.pop();
        }

        let source_text = std::str::from_utf8(&entry.content)
            .map_err(|e| PolicyError::ScriptError(format!("policy source is not valid UTF-8: {e}")))?;
        let ast = engine::compile(&self.engine, source_text)?;
        Ok(PolicyInstance {
            ast,
            script_hash: entry.content_hash,
        })
    }
}
