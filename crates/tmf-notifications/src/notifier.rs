//! Fire-and-forget webhook delivery: task-per-delivery, bounded retry.
//!
//! Grounded on the teacher's `WebhookAdapter` HTTP mechanics (POST JSON,
//! header injection, success-on-2xx), but delivered as an independent
//! `tokio::spawn`ed task per subscription rather than through a
//! persistent polling queue — the subscription-map lock is never held
//! across this I/O.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tmf_core::event::EventEnvelope;

use crate::error::DeliveryError;
use crate::registry::SubscriptionRegistry;
use crate::types::Subscription;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_START_MS: u64 = 200;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Notifier {
    registry: Arc<SubscriptionRegistry>,
    client: Client,
}

impl Notifier {
    /// Builds a `Notifier` with the default per-attempt HTTP timeout (10 s).
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self::with_timeout(registry, DEFAULT_TIMEOUT)
    }

    /// Builds a `Notifier` whose per-attempt HTTP timeout comes from
    /// configuration rather than the built-in default.
    pub fn with_timeout(registry: Arc<SubscriptionRegistry>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client configuration is valid");
        Self { registry, client }
    }

    /// Publishes `envelope` to every subscription in `envelope.api_family`
    /// whose `eventTypes` accept `envelope.event_type`. Never awaits
    /// delivery; returns as soon as matching subscriptions are spawned.
    pub fn publish(&self, envelope: EventEnvelope) {
        let subscriptions = self
            .registry
            .matching(&envelope.api_family, &envelope.event_type);
        for subscription in subscriptions {
            let client = self.client.clone();
            let envelope = envelope.clone();
            tokio::spawn(async move {
                deliver_with_retry(&client, &subscription, &envelope).await;
            });
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}

async fn deliver_with_retry(client: &Client, subscription: &Subscription, envelope: &EventEnvelope) {
    let mut backoff_ms = BACKOFF_START_MS;
    for attempt in 1..=MAX_ATTEMPTS {
        match attempt_delivery(client, subscription, envelope).await {
            Ok(()) => return,
            Err(e) if attempt == MAX_ATTEMPTS => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    callback = %subscription.callback,
                    error = %e,
                    "notification delivery failed after {} attempts, giving up",
                    MAX_ATTEMPTS
                );
                return;
            }
            Err(e) => {
                tracing::debug!(
                    subscription_id = %subscription.id,
                    attempt,
                    error = %e,
                    "notification delivery attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }
    }
}

async fn attempt_delivery(
    client: &Client,
    subscription: &Subscription,
    envelope: &EventEnvelope,
) -> Result<(), DeliveryError> {
    let mut request = client.post(&subscription.callback).json(envelope);
    if let Some(token) = subscription.headers.get("x-auth-token") {
        request = request.header("x-auth-token", token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status(response.status().as_u16()))
    }
}
