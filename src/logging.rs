// Logging setup, powered by tracing-subscriber

use tracing_subscriber::EnvFilter;

/// Noisy dependencies kept at warn unless asked otherwise
const QUIET_TARGETS: [&str; 3] = ["hyper", "tower", "axum::rejection"];

/// Base level plus the quiet-target overrides; `RUST_LOG` wins when set
pub fn build_env_filter(level: &str) -> Result<EnvFilter, String> {
    if let Ok(from_env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !from_env.trim().is_empty() {
            return EnvFilter::try_new(&from_env)
                .map_err(|e| format!("Invalid RUST_LOG '{}': {}", from_env, e));
        }
    }

    let mut directives = vec![level.to_string()];
    for target in QUIET_TARGETS {
        directives.push(format!("{}=warn", target));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| format!("Invalid tracing filter '{}': {}", filter_str, e))
}

/// Install the global subscriber
pub fn init_logging(level: &str) -> Result<(), String> {
    let filter = build_env_filter(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| format!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_plain_levels() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let filter = build_env_filter("debug").unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn test_filter_rejects_garbage() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        assert!(build_env_filter("ora_query_studio=verbose").is_err());
    }
}
