pub mod error;
pub mod notifier;
pub mod registry;
pub mod types;

pub use error::DeliveryError;
pub use notifier::Notifier;
pub use registry::SubscriptionRegistry;
pub use types::{Subscription, SubscriptionRequest};
