use std::env;
use std::sync::Once;

use tracing::{debug, info, Level};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Variable holding the test log filter; falls back to `RUST_LOG`.
pub const LOG_ENV: &str = "AUGTREE_LOG";

const DEFAULT_FILTER: &str = "augtree=debug";

/// Targets that trace once per tree node or path step.
const PER_NODE_TARGETS: [&str; 2] = ["augtree::domain::tree", "augtree::domain::eval"];

static TEST_SETUP: Once = Once::new();

/// Install a test-captured tracing subscriber once per test binary.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn filter_directives(augtree_log: Option<String>, rust_log: Option<String>) -> String {
    augtree_log
        .or(rust_log)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn setup_test_logging() {
    let directives = filter_directives(env::var(LOG_ENV).ok(), env::var("RUST_LOG").ok());
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Per-node tracing only with an explicit trace directive for it
    let per_node_wanted = PER_NODE_TARGETS.iter().any(|t| directives.contains(t));
    let module_filter = filter_fn(move |metadata| {
        per_node_wanted
            || *metadata.level() != Level::TRACE
            || !PER_NODE_TARGETS
                .iter()
                .any(|name| metadata.target().starts_with(name))
    });

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn given_repeated_calls_when_init_test_setup_then_idempotent() {
        init_test_setup();
        init_test_setup();
    }

    #[rstest]
    #[case(None, None, "augtree=debug")]
    #[case(None, Some("info"), "info")]
    #[case(Some("augtree::domain::tree=trace"), Some("info"), "augtree::domain::tree=trace")]
    #[case(Some("  "), None, "augtree=debug")]
    fn given_env_values_when_building_filter_then_augtree_log_wins(
        #[case] augtree_log: Option<&str>,
        #[case] rust_log: Option<&str>,
        #[case] expected: &str,
    ) {
        let directives = filter_directives(augtree_log.map(String::from), rust_log.map(String::from));
        assert_eq!(directives, expected);
    }
}
