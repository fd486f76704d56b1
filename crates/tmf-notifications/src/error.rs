use thiserror::Error;

/// A single delivery attempt's failure, kept internal to `notifier.rs`: a
/// subscriber never sees this, and the pipeline never sees it either —
/// publishing is fire-and-forget, so the final attempt's error is only
/// ever logged, never returned to a caller (see `Notifier::publish`).
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("non-2xx status {0}")]
    Status(u16),
}
