use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "rtblock=info,rtblock_engine=info";

/// Installs the global subscriber. `RUST_LOG` replaces the default filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}
