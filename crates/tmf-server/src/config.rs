//! Process configuration: built-in defaults, layered with an optional
//! `config.toml`, then `TMF_`-prefixed environment variables.
//!
//! Grounded on the teacher's `octofhir-server::config::loader` module —
//! same `config::Config::builder()` + `File` + `Environment` layering,
//! same validate-after-deserialize shape — scaled down to the handful of
//! fields this server actually needs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub file_cache: FileCacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Location of the one policy source file: a local path or an `https://` URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_policy_source")]
    pub source: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            source: default_policy_source(),
        }
    }
}

fn default_policy_source() -> String {
    "policy.rhai".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default = "default_verifier_url")]
    pub discovery_url: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            discovery_url: default_verifier_url(),
        }
    }
}

fn default_verifier_url() -> String {
    "https://verifier.example.com".to_string()
}

/// The server-operator identity injected as `SellerOperator` on every
/// normalized object, and the id of its auto-provisioned organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_operator_did")]
    pub did: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            did: default_operator_did(),
        }
    }
}

fn default_operator_did() -> String {
    "did:elsi:VATOPERATOR-00000000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_notification_timeout_secs(),
        }
    }
}

fn default_notification_timeout_secs() -> u64 {
    10
}

impl NotificationsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCacheConfig {
    #[serde(default = "default_local_restat_secs")]
    pub local_restat_secs: u64,
    #[serde(default = "default_remote_ttl_secs")]
    pub remote_default_ttl_secs: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            local_restat_secs: default_local_restat_secs(),
            remote_default_ttl_secs: default_remote_ttl_secs(),
        }
    }
}

fn default_local_restat_secs() -> u64 {
    20
}

fn default_remote_ttl_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            policy: PolicyConfig::default(),
            verifier: VerifierConfig::default(),
            operator: OperatorConfig::default(),
            notifications: NotificationsConfig::default(),
            file_cache: FileCacheConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .http
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.http.port))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.http.port == 0 {
            return Err("http.port must be > 0".to_string());
        }
        if self.policy.source.trim().is_empty() {
            return Err("policy.source must not be empty".to_string());
        }
        if self.verifier.discovery_url.trim().is_empty() {
            return Err("verifier.discovery_url must not be empty".to_string());
        }
        Ok(())
    }
}

/// Loads config from (in increasing precedence): built-in defaults, an
/// optional `config.toml` in the working directory, then environment
/// variables prefixed `TMF_` with `__` as the nested-key separator (e.g.
/// `TMF_HTTP__PORT=9090`).
pub fn load() -> Result<ServerConfig, anyhow::Error> {
    let _ = dotenvy::dotenv();

    let mut builder = Config::builder().add_source(Config::try_from(&ServerConfig::default())?);

    let default_path = std::path::PathBuf::from("config.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    builder = builder.add_source(Environment::with_prefix("TMF").try_parsing(true).separator("__"));

    let cfg = builder.build()?;
    let merged: ServerConfig = cfg.try_deserialize()?;
    merged.validate().map_err(anyhow::Error::msg)?;
    Ok(merged)
}
