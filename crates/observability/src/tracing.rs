//! Tracing/logging initialization.
//!
//! JSON lines in production, human-readable output for local runs. The
//! `stockroom::audit` target carries authorization decisions and can be
//! filtered on its own, e.g. `RUST_LOG=info,stockroom::audit=debug`.

use tracing_subscriber::EnvFilter;

use crate::{LogFormat, LogSettings};

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(settings: &LogSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match settings.format {
        LogFormat::Json => builder.json().with_target(true).try_init(),
        LogFormat::Pretty => builder.pretty().with_target(true).try_init(),
    };
}
