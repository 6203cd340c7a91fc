use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Level used when the configured one is not recognised.
pub const FALLBACK_LOG_LEVEL: LevelFilter = LevelFilter::DEBUG;

/// Parse a configured log level (`trace`, `debug`, `info`, `warn`, `error`,
/// `off`), falling back to [`FALLBACK_LOG_LEVEL`].
///
/// Returns the level and whether the fallback was taken.
pub fn parse_log_level(log_level: &str) -> (LevelFilter, bool) {
    let trimmed = log_level.trim();
    if trimmed.is_empty() {
        return (FALLBACK_LOG_LEVEL, true);
    }
    match trimmed.parse::<LevelFilter>() {
        Ok(level) => (level, false),
        Err(_) => (FALLBACK_LOG_LEVEL, true),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str, log_format: &str) {
    let (level, fell_back) = parse_log_level(log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    if fell_back {
        tracing::warn!(
            configured = log_level,
            fallback = %FALLBACK_LOG_LEVEL,
            "unknown log level, using fallback"
        );
    }
}
