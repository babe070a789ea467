//! Tracing initialisation for programs embedding the Quorum engine.
//!
//! The engine itself only emits `tracing` events; the embedding program
//! calls [`init_tracing`] once to decide where they go.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable selecting JSON log output when set to `json`.
pub const ENV_LOG_FORMAT: &str = "QUORUM_LOG_FORMAT";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json`, each event is one
/// JSON line. Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// [`init_tracing`] with the format taken from `QUORUM_LOG_FORMAT`.
pub fn init_tracing_from_env(level: Level) {
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    init_tracing(json, level);
}
