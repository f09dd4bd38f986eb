//! Structured-logging initialization.
//!
//! Maps the `verbose` configuration knob (0–4) onto a `tracing` level
//! filter. The daily rotating file logger used in production deployments is
//! an external collaborator; the core only emits `tracing` events.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Translates the `[General] verbose` setting into a level filter.
#[must_use]
pub fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs a global `tracing` subscriber at the requested verbosity.
///
/// `RUST_LOG` takes precedence when set. Calling this twice is harmless;
/// the second installation is ignored.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(verbosity).into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_onto_levels() {
        assert_eq!(level_filter(0), LevelFilter::ERROR);
        assert_eq!(level_filter(1), LevelFilter::WARN);
        assert_eq!(level_filter(2), LevelFilter::INFO);
        assert_eq!(level_filter(3), LevelFilter::DEBUG);
        assert_eq!(level_filter(4), LevelFilter::TRACE);
        assert_eq!(level_filter(200), LevelFilter::TRACE);
    }
}
