//! Tracing and logging (shared setup).

use serde::Deserialize;

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(settings: &LogSettings) {
    tracing::init(settings);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_json_at_info() {
        let s: LogSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, LogSettings::default());

        let s: LogSettings = serde_json::from_str(r#"{"format":"pretty","filter":"debug"}"#).unwrap();
        assert_eq!(s.format, LogFormat::Pretty);
        assert_eq!(s.filter, "debug");
    }

    #[test]
    fn init_twice_is_a_no_op() {
        init(&LogSettings::default());
        init(&LogSettings {
            filter: "warn".to_string(),
            format: LogFormat::Pretty,
        });
    }
}
