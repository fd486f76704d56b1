//! OIDC-backed bearer token verification and `CallerIdentity` derivation.
//!
//! Grounded on the teacher's `ProviderJwksCache`: cache-then-fetch, HTTPS-only
//! fetch, single-writer/many-reader refresh, freshness window rather than
//! exact-TTL tracking per key.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::TokenError;

const JWKS_FRESHNESS_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

struct CachedKey {
    key: DecodingKey,
    algorithm: Algorithm,
    fetched_at: Instant,
}

pub struct TokenVerifier {
    discovery_url: String,
    client: Client,
    cached: RwLock<Option<CachedKey>>,
}

impl TokenVerifier {
    pub fn new(discovery_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            discovery_url: discovery_url.into(),
            client,
            cached: RwLock::new(None),
        }
    }

    /// Resolves the discovery document and fetches the JWK set once, to
    /// fail fast at bootstrap rather than on the first request.
    pub async fn warm_up(&self) -> Result<(), TokenError> {
        self.ensure_key().await.map(|_| ())
    }

    async fn ensure_key(&self) -> Result<Arc<(DecodingKey, Algorithm)>, TokenError> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_FRESHNESS_WINDOW {
                    return Ok(Arc::new((cached.key.clone(), cached.algorithm)));
                }
            }
        }

        match self.refresh().await {
            Ok(pair) => Ok(pair),
            Err(e) => {
                let guard = self.cached.read().await;
                if let Some(cached) = guard.as_ref() {
                    tracing::warn!(error = %e, "jwks refresh failed, serving stale signing key");
                    Ok(Arc::new((cached.key.clone(), cached.algorithm)))
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn refresh(&self) -> Result<Arc<(DecodingKey, Algorithm)>, TokenError> {
        let discovery_url = format!("{}/.well-known/openid-configuration", self.discovery_url.trim_end_matches('/'));
        let discovery: DiscoveryDocument = self
            .client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| TokenError::Discovery(e.to_string()))?
            .json()
            .await
            .map_err(|e| TokenError::Discovery(e.to_string()))?;

        if !is_acceptable_jwks_scheme(&discovery.jwks_uri) {
            return Err(TokenError::Jwks("jwks_uri must use https".to_string()));
        }

        let jwks: JwkSet = self
            .client
            .get(&discovery.jwks_uri)
            .send()
            .await
            .map_err(|e| TokenError::Jwks(e.to_string()))?
            .json()
            .await
            .map_err(|e| TokenError::Jwks(e.to_string()))?;

        let jwk = jwks
            .keys
            .iter()
            .find(|k| !matches!(k.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .ok_or(TokenError::NoSigningKeys)?;

        let key = DecodingKey::from_jwk(jwk).map_err(|e| TokenError::Jwks(e.to_string()))?;
        let algorithm = jwk_algorithm(jwk.common.key_algorithm);

        let mut guard = self.cached.write().await;
        *guard = Some(CachedKey {
            key: key.clone(),
            algorithm,
            fetched_at: Instant::now(),
        });
        Ok(Arc::new((key, algorithm)))
    }

    /// Verifies `token` and derives the caller's claims and identity.
    pub async fn verify(&self, token: &str) -> Result<(Value, CallerIdentity), TokenError> {
        let pair = self.ensure_key().await?;
        let (key, algorithm) = (&pair.0, pair.1);

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        let data = decode::<Value>(token, key, &validation)
            .map_err(|e| TokenError::InvalidSignature(e.to_string()))?;
        let identity = CallerIdentity::derive(&data.claims);
        Ok((data.claims, identity))
    }
}

/// `https://` is required except on a loopback interface, where plaintext is
/// tolerated the way RFC 8252 §7.3 tolerates it for native-app redirects —
/// it's how a locally-run provider (or a test harness) is reached at all.
fn is_acceptable_jwks_scheme(jwks_uri: &str) -> bool {
    jwks_uri.starts_with("https://")
        || jwks_uri.starts_with("http://127.0.0.1")
        || jwks_uri.starts_with("http://localhost")
        || jwks_uri.starts_with("http://[::1]")
}

fn jwk_algorithm(alg: Option<KeyAlgorithm>) -> Algorithm {
    match alg {
        Some(KeyAlgorithm::RS256) => Algorithm::RS256,
        Some(KeyAlgorithm::RS384) => Algorithm::RS384,
        Some(KeyAlgorithm::RS512) => Algorithm::RS512,
        Some(KeyAlgorithm::ES256) => Algorithm::ES256,
        Some(KeyAlgorithm::ES384) => Algorithm::ES384,
        Some(KeyAlgorithm::PS256) => Algorithm::PS256,
        Some(KeyAlgorithm::PS384) => Algorithm::PS384,
        Some(KeyAlgorithm::PS512) => Algorithm::PS512,
        _ => Algorithm::RS256,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallerIdentity {
    #[serde(rename = "commonName", default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(rename = "emailAddress", default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(rename = "organizationIdentifier", default)]
    pub organization_identifier: Option<String>,
    #[serde(rename = "serialNumber", default)]
    pub serial_number: Option<String>,
    #[serde(rename = "isAuthenticated", default)]
    pub is_authenticated: bool,
    #[serde(rename = "isLEAR", default)]
    pub is_lear: bool,
    #[serde(rename = "isOwner", default)]
    pub is_owner: bool,
}

impl CallerIdentity {
    /// `did:elsi:<organizationIdentifier>`, the canonical DID form.
    pub fn did(&self) -> Option<String> {
        self.organization_identifier
            .as_ref()
            .map(|raw| format!("did:elsi:{raw}"))
    }

    pub fn derive(claims: &Value) -> Self {
        let vc = claims.get("vc");
        let is_authenticated = vc.map(|v| !v.is_null()).unwrap_or(false);
        if !is_authenticated {
            return CallerIdentity::default();
        }

        let mandator = vc
            .and_then(|v| v.pointer("/credentialSubject/mandate/mandator"))
            .cloned()
            .unwrap_or(Value::Null);

        let mut identity = CallerIdentity {
            common_name: str_field(&mandator, "commonName"),
            country: str_field(&mandator, "country"),
            email_address: str_field(&mandator, "emailAddress"),
            organization: str_field(&mandator, "organization"),
            organization_identifier: str_field(&mandator, "organizationIdentifier"),
            serial_number: str_field(&mandator, "serialNumber"),
            is_authenticated: true,
            is_lear: false,
            is_owner: false,
        };

        let powers = vc
            .and_then(|v| v.pointer("/credentialSubject/mandate/power"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        identity.is_lear = powers.iter().any(is_onboarding_execute_power);
        identity
    }
}

fn str_field(v: &Value, field: &str) -> Option<String> {
    v.get(field).and_then(Value::as_str).map(String::from)
}

/// Matches `{type: "Domain", domain: "DOME", function: "Onboarding", action: "execute"}`
/// case-insensitively, accepting either the legacy field names or the
/// `tmf_*`-prefixed set.
fn is_onboarding_execute_power(power: &Value) -> bool {
    let get = |legacy: &str, prefixed: &str| -> Option<String> {
        str_field(power, legacy).or_else(|| str_field(power, prefixed))
    };
    let matches = |field: Option<String>, expected: &str| {
        field
            .map(|v| v.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    };

    matches(get("type", "tmf_type"), "Domain")
        && matches(get("domain", "tmf_domain"), "DOME")
        && matches(get("function", "tmf_function"), "Onboarding")
        && matches(get("action", "tmf_action"), "execute")
}
