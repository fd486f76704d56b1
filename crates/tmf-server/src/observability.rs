//! Tracing initialization, following the teacher's `observability` module:
//! `RUST_LOG` (or a sane default) driving an `EnvFilter`, `fmt` layer.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry().with(filter).with(fmt::layer()).try_init();
}
