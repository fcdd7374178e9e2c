use tracing_subscriber::EnvFilter;

/// Targets logged at full verbosity: the load generator and the test server.
const CRATE_NAMES: &[&str] = &["trackload", "trackload_test"];

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner. Without `RUST_LOG`, only the load
/// generator and the test server log below `ERROR`, since a single iteration already issues
/// around a hundred requests through hyper. A set `RUST_LOG` replaces this default.
///
/// # Example
///
/// ```
/// trackload_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

fn default_filter() -> EnvFilter {
    CRATE_NAMES
        .iter()
        .fold(EnvFilter::new("ERROR"), |filter, name| {
            filter.add_directive(format!("{name}=TRACE").parse().unwrap())
        })
}
