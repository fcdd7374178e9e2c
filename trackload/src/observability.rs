//! Logging setup for the trackload binary.

use std::env;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs a global subscriber that logs to stderr, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let (level, env_filter) = parse_rust_log();
    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(level)))
        .with(env_filter)
        .init();
}

/// Returns the maximum level and the filter for the log output.
///
/// A plain level in `RUST_LOG`, such as `debug`, is applied to our own crate. Any other value is
/// used literally, so users can pass their own directives.
pub fn parse_rust_log() -> (Level, EnvFilter) {
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => level,
            Err(_) => return (Level::TRACE, EnvFilter::new(value)),
        },
        Err(_) => Level::INFO,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`. Every
    // virtual user drives its own pooled connections, so dependencies stay at WARN to keep
    // per-connection chatter of hyper and reqwest out of the output.
    let env_filter = EnvFilter::new(
        "WARN,\
        trackload=TRACE,\
        ",
    );

    (level, env_filter)
}
