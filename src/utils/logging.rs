use tracing_subscriber::EnvFilter;

/// Installs the process-wide tracing subscriber. `RUST_LOG` wins over the
/// configured level; `json` format is for collection agents, anything else
/// gets the human-readable layout.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
