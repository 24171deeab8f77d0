use std::env;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

fn filter_directive(trail_log: Option<String>, rust_log: Option<String>) -> String {
    trail_log
        .filter(|v| !v.trim().is_empty())
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
pub fn init() {
    let directive = filter_directive(env::var("TRAIL_LOG").ok(), env::var("RUST_LOG").ok());
    let filter =
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
