//! Core types shared across the TMF object server: the error taxonomy,
//! id minting, RFC3339 time helpers and the event envelope.

pub mod error;
pub mod event;
pub mod id;
pub mod time;

pub use error::CoreError;
