use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tmf_core::time::serde_rfc3339;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    #[serde(rename = "apiFamily")]
    pub api_family: String,
    pub callback: String,
    #[serde(rename = "eventTypes", default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(with = "serde_rfc3339")]
    pub created_at: OffsetDateTime,
    pub href: String,
}

impl Subscription {
    /// Whether this subscription wants to hear about `event_type`: an
    /// empty `eventTypes` set means "everything in this apiFamily".
    pub fn matches_event_type(&self, event_type: &str) -> bool {
        self.event_types.is_empty() || self.event_types.iter().any(|t| t == event_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRequest {
    pub callback: String,
    #[serde(rename = "eventTypes", default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query: Option<String>,
}
