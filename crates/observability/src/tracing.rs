//! Tracing/logging initialization.
//!
//! JSON log lines with timestamps; service spans carry the caller's actor and
//! correlation id, so every line of one call can be grepped together.

use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Initialize tracing/logging for the process.
///
/// `RUST_LOG` wins over `fallback`. Safe to call multiple times (subsequent
/// calls are no-ops).
pub fn init(fallback: Option<&str>) {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), fallback);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

fn build_filter(env: Option<&str>, fallback: Option<&str>) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| fallback.and_then(|level| EnvFilter::try_new(level).ok()))
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directives_take_precedence() {
        let filter = build_filter(Some("debug"), Some("warn"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn fallback_used_without_env() {
        assert_eq!(build_filter(None, Some("warn")).to_string(), "warn");
        assert_eq!(build_filter(None, None).to_string(), DEFAULT_LEVEL);
    }

    #[test]
    fn init_twice_is_harmless() {
        init(Some("error"));
        init(None);
    }
}
