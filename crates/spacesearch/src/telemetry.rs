//! Logging setup

use tracing::Level;
use tracing_subscriber::fmt;

use crate::config::LogConfig;

/// Parse a configured level; unknown values fall back to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global fmt subscriber.
///
/// Returns `false` when a subscriber was already installed, in which case
/// nothing changes.
pub fn init_logging(config: &LogConfig) -> bool {
    let debug = parse_level(&config.level) >= Level::DEBUG;
    fmt()
        .with_max_level(parse_level(&config.level))
        .with_target(debug)
        .with_thread_ids(debug)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
