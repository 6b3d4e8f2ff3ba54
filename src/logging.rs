//! # Logging Setup
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the embedding application. [`init_tracing`] is a convenience for
//! applications and tests that want console output.
//!
//! ## Environment Variables:
//! - `RUST_LOG`: controls what gets logged (e.g. "debug", "offline_stt=debug")
//! - If not set, defaults to "offline_stt=info"

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a console subscriber. Safe to call more than once; only the
/// first call (or an already installed global subscriber) wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_stt=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::info!("subscriber installed");
    }
}
